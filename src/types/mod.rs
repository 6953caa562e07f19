#![forbid(unsafe_code)]
//! Identifiers, timestamps, the value model and the crate-wide error type.

use std::fmt;

pub mod checksum;
pub mod value;

pub use checksum::{Checksum, Crc32Fast};
pub use value::{Any, OidKey, PropertyType};

/// Label identifier for vertex and edge labels; one byte on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub u8);

/// Internal position of a vertex inside its label's table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Reserved position meaning "the vertex being inserted by this transaction".
    ///
    /// Never handed out by a graph store.
    pub const SELF_SENTINEL: VertexId = VertexId(u32::MAX);

    /// Returns `true` for [`VertexId::SELF_SENTINEL`].
    pub const fn is_sentinel(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Monotonic write-ordering token issued by the timestamp authority.
pub type Timestamp = u64;

/// Sentinel timestamp carried by a finished (committed or aborted) transaction.
pub const TIMESTAMP_FINISHED: Timestamp = Timestamp::MAX;

/// Which side of an edge a diagnostic refers to.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Endpoint {
    /// Edge source.
    Source,
    /// Edge destination.
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

/// Errors produced by the write path, the log and the stores.
#[derive(thiserror::Error, Debug)]
pub enum PenumbraError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Bytes on disk or in a buffer do not decode.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller passed an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Caller passed an unusable argument (formatted message).
    #[error("invalid argument: {0}")]
    InvalidOwned(String),
    /// Requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// Property list length differs from the label's schema.
    #[error("{label} properties size not match, expected {expected}, but got {actual}")]
    PropertyCountMismatch {
        /// Label name.
        label: String,
        /// Declared property count.
        expected: usize,
        /// Supplied property count.
        actual: usize,
    },
    /// Property value tag differs from the declared type.
    #[error("{label}{} property type not match, expected {expected}, but got {actual}", fmt_index(.index))]
    PropertyTypeMismatch {
        /// Label name.
        label: String,
        /// Position of the offending value, when the label declares a list.
        index: Option<usize>,
        /// Declared type.
        expected: PropertyType,
        /// Supplied type.
        actual: PropertyType,
    },
    /// Edge endpoint identifier has no position in the graph.
    #[error("{endpoint} vertex {label}[{id}] not found")]
    VertexNotFound {
        /// Which endpoint failed to resolve.
        endpoint: Endpoint,
        /// Vertex label name.
        label: String,
        /// Rendered identifier.
        id: String,
    },
    /// Label id is not registered in the schema.
    #[error("unknown {kind} label {label}")]
    UnknownLabel {
        /// `"vertex"` or `"edge"`.
        kind: &'static str,
        /// Raw label id.
        label: u8,
    },
    /// The transaction already staged its single vertex insert.
    #[error("vertex {label}[{id}] already staged; a single-vertex transaction inserts one vertex")]
    VertexAlreadyStaged {
        /// Label name of the staged vertex.
        label: String,
        /// Rendered identifier of the staged vertex.
        id: String,
    },
    /// The durable log refused the record.
    #[error("wal append failed: {0}")]
    WalAppend(String),
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("[{i}]"),
        None => String::new(),
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PenumbraError>;

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            f.write_str("self")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u8> for LabelId {
    fn from(value: u8) -> Self {
        LabelId(value)
    }
}

impl From<LabelId> for u8 {
    fn from(value: LabelId) -> Self {
        value.0
    }
}

impl From<u32> for VertexId {
    fn from(value: u32) -> Self {
        VertexId(value)
    }
}
