//! Binary layout of an insert record.
//!
//! ```text
//! header:  length u64 LE | record_type u8 | timestamp u64 LE
//! body:    op*
//! op 0:    label u8 | id:any | prop:any * (schema-declared count)
//! op 1:    src_label u8 | src:any | dst_label u8 | dst:any | edge_label u8 | prop:any
//! ```
//!
//! `any` is a tagged value as produced by [`Any::encode`]. `length` counts the
//! body bytes only.

use std::fmt;

use crate::primitives::bytes::buf::Cursor;
use crate::storage::catalog::SchemaRegistry;
use crate::types::{Any, LabelId, PenumbraError, Result, Timestamp};

/// Size of the fixed record header.
pub const WAL_HEADER_LEN: usize = 17;

/// Which transaction kind produced a record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RecordType {
    /// Vertex/edge insert record written by a single-vertex insert transaction.
    Insert = 0,
}

impl RecordType {
    /// Parses the header byte.
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(RecordType::Insert),
            _ => Err(PenumbraError::Corruption("unknown wal record type")),
        }
    }
}

/// Leading byte of each body operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OpTag {
    /// Vertex insert.
    InsertVertex = 0,
    /// Edge insert.
    InsertEdge = 1,
}

impl OpTag {
    /// Parses an op byte; `None` for tags this codec does not know.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(OpTag::InsertVertex),
            1 => Some(OpTag::InsertEdge),
            _ => None,
        }
    }
}

/// Decoded record header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WalHeader {
    /// Body length in bytes.
    pub length: u64,
    /// Producing transaction kind.
    pub record_type: RecordType,
    /// Commit timestamp.
    pub timestamp: Timestamp,
}

impl WalHeader {
    /// Encodes the header.
    pub fn encode(&self) -> [u8; WAL_HEADER_LEN] {
        let mut dst = [0u8; WAL_HEADER_LEN];
        dst[0..8].copy_from_slice(&self.length.to_le_bytes());
        dst[8] = self.record_type as u8;
        dst[9..17].copy_from_slice(&self.timestamp.to_le_bytes());
        dst
    }

    /// Parses the header at the start of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(src);
        let length = cur.u64_le()?;
        let record_type = RecordType::from_u8(cur.u8()?)?;
        let timestamp = cur.u64_le()?;
        Ok(Self {
            length,
            record_type,
            timestamp,
        })
    }
}

/// Appends a vertex-insert operation.
pub fn encode_vertex_insert(out: &mut Vec<u8>, label: LabelId, id: &Any, properties: &[Any]) {
    out.push(OpTag::InsertVertex as u8);
    out.push(label.0);
    id.encode(out);
    for prop in properties {
        prop.encode(out);
    }
}

/// Appends an edge-insert operation.
pub fn encode_edge_insert(
    out: &mut Vec<u8>,
    src_label: LabelId,
    src: &Any,
    dst_label: LabelId,
    dst: &Any,
    edge_label: LabelId,
    property: &Any,
) {
    out.push(OpTag::InsertEdge as u8);
    out.push(src_label.0);
    src.encode(out);
    out.push(dst_label.0);
    dst.encode(out);
    out.push(edge_label.0);
    property.encode(out);
}

/// One decoded body operation.
#[derive(Clone, Debug, PartialEq)]
pub enum WalOp {
    /// Vertex insert with its properties in column order.
    InsertVertex {
        /// Vertex label.
        label: LabelId,
        /// External identifier.
        id: Any,
        /// Property values.
        properties: Vec<Any>,
    },
    /// Edge insert referencing endpoints by external identifier.
    InsertEdge {
        /// Source label.
        src_label: LabelId,
        /// Source identifier.
        src: Any,
        /// Destination label.
        dst_label: LabelId,
        /// Destination identifier.
        dst: Any,
        /// Edge label.
        label: LabelId,
        /// Property value.
        property: Any,
    },
}

impl fmt::Display for WalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalOp::InsertVertex {
                label,
                id,
                properties,
            } => {
                write!(f, "insert_vertex label={label} id={id} props=[")?;
                for (i, p) in properties.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str("]")
            }
            WalOp::InsertEdge {
                src_label,
                src,
                dst_label,
                dst,
                label,
                property,
            } => write!(
                f,
                "insert_edge {src_label}:{src} -[{label}]-> {dst_label}:{dst} prop={property}"
            ),
        }
    }
}

/// A fully decoded record.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    /// Header fields.
    pub header: WalHeader,
    /// Body operations in order.
    pub ops: Vec<WalOp>,
}

/// Splits a record into its header and body, checking the declared length.
pub fn split_record(bytes: &[u8]) -> Result<(WalHeader, &[u8])> {
    if bytes.len() < WAL_HEADER_LEN {
        return Err(PenumbraError::Corruption("wal record header truncated"));
    }
    let header = WalHeader::decode(bytes)?;
    let body = &bytes[WAL_HEADER_LEN..];
    if header.length != body.len() as u64 {
        return Err(PenumbraError::Corruption("wal record length mismatch"));
    }
    Ok((header, body))
}

/// Decodes a whole record. Vertex property counts come from `schema`.
pub fn decode_record(bytes: &[u8], schema: &dyn SchemaRegistry) -> Result<DecodedRecord> {
    let (header, body) = split_record(bytes)?;
    let mut cur = Cursor::new(body);
    let mut ops = Vec::new();
    while !cur.is_empty() {
        ops.push(decode_op(&mut cur, schema)?);
    }
    Ok(DecodedRecord { header, ops })
}

fn decode_op(cur: &mut Cursor<'_>, schema: &dyn SchemaRegistry) -> Result<WalOp> {
    let raw = cur.u8()?;
    match OpTag::from_u8(raw) {
        Some(OpTag::InsertVertex) => {
            let label = LabelId(cur.u8()?);
            let id = Any::decode(cur)?;
            let count = schema
                .vertex_property_types(label)
                .map_err(|_| PenumbraError::Corruption("wal vertex label unknown"))?
                .len();
            let mut properties = Vec::with_capacity(count);
            for _ in 0..count {
                properties.push(Any::decode(cur)?);
            }
            Ok(WalOp::InsertVertex {
                label,
                id,
                properties,
            })
        }
        Some(OpTag::InsertEdge) => {
            let src_label = LabelId(cur.u8()?);
            let src = Any::decode(cur)?;
            let dst_label = LabelId(cur.u8()?);
            let dst = Any::decode(cur)?;
            let label = LabelId(cur.u8()?);
            let property = Any::decode(cur)?;
            Ok(WalOp::InsertEdge {
                src_label,
                src,
                dst_label,
                dst,
                label,
                property,
            })
        }
        None => Err(PenumbraError::Corruption("unknown wal op tag")),
    }
}
