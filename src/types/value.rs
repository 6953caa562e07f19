//! Tagged property values and their declared types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::primitives::bytes::{buf::Cursor, var};
use crate::types::{PenumbraError, Result};

pub(crate) const TAG_EMPTY: u8 = 0;
pub(crate) const TAG_BOOL: u8 = 1;
pub(crate) const TAG_INT32: u8 = 2;
pub(crate) const TAG_UINT32: u8 = 3;
pub(crate) const TAG_INT64: u8 = 4;
pub(crate) const TAG_UINT64: u8 = 5;
pub(crate) const TAG_FLOAT: u8 = 6;
pub(crate) const TAG_DOUBLE: u8 = 7;
pub(crate) const TAG_DATE: u8 = 8;
pub(crate) const TAG_STRING_VIEW: u8 = 9;
pub(crate) const TAG_STRING_MAP: u8 = 10;
pub(crate) const TAG_RECORD: u8 = 11;

/// Nesting limit for records decoded from untrusted bytes.
const MAX_RECORD_DEPTH: usize = 8;

/// Declared type of a property column, as registered in the schema.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// No value; the type of property-less edges.
    Empty,
    /// Boolean.
    Bool,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Plain string.
    StringView,
    /// Dictionary-encoded string column. Schema-only: values arrive as
    /// [`Any::StringView`].
    StringMap,
    /// Tuple of values; the type of multi-property edges.
    Record,
}

impl PropertyType {
    /// Wire tag of this type.
    pub const fn tag(self) -> u8 {
        match self {
            PropertyType::Empty => TAG_EMPTY,
            PropertyType::Bool => TAG_BOOL,
            PropertyType::Int32 => TAG_INT32,
            PropertyType::UInt32 => TAG_UINT32,
            PropertyType::Int64 => TAG_INT64,
            PropertyType::UInt64 => TAG_UINT64,
            PropertyType::Float => TAG_FLOAT,
            PropertyType::Double => TAG_DOUBLE,
            PropertyType::Date => TAG_DATE,
            PropertyType::StringView => TAG_STRING_VIEW,
            PropertyType::StringMap => TAG_STRING_MAP,
            PropertyType::Record => TAG_RECORD,
        }
    }

    /// Maps a wire tag back to its type.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            TAG_EMPTY => PropertyType::Empty,
            TAG_BOOL => PropertyType::Bool,
            TAG_INT32 => PropertyType::Int32,
            TAG_UINT32 => PropertyType::UInt32,
            TAG_INT64 => PropertyType::Int64,
            TAG_UINT64 => PropertyType::UInt64,
            TAG_FLOAT => PropertyType::Float,
            TAG_DOUBLE => PropertyType::Double,
            TAG_DATE => PropertyType::Date,
            TAG_STRING_VIEW => PropertyType::StringView,
            TAG_STRING_MAP => PropertyType::StringMap,
            TAG_RECORD => PropertyType::Record,
            _ => return Err(PenumbraError::Corruption("unknown property type tag")),
        })
    }

    /// Whether a value of type `actual` may be stored in a column declared as `self`.
    ///
    /// Exact match, plus string views into dictionary-encoded string columns.
    pub fn accepts(self, actual: PropertyType) -> bool {
        self == actual || (self == PropertyType::StringMap && actual == PropertyType::StringView)
    }

    fn name(self) -> &'static str {
        match self {
            PropertyType::Empty => "empty",
            PropertyType::Bool => "bool",
            PropertyType::Int32 => "int32",
            PropertyType::UInt32 => "uint32",
            PropertyType::Int64 => "int64",
            PropertyType::UInt64 => "uint64",
            PropertyType::Float => "float",
            PropertyType::Double => "double",
            PropertyType::Date => "date",
            PropertyType::StringView => "string_view",
            PropertyType::StringMap => "string_map",
            PropertyType::Record => "record",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed property value or vertex identifier.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Any {
    /// No value.
    #[default]
    Empty,
    /// Boolean.
    Bool(bool),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Owned string.
    StringView(String),
    /// Tuple of values.
    Record(Vec<Any>),
}

/// Hashable form of a vertex identifier.
///
/// Integers of either width collapse onto the same key so a lookup does not
/// depend on which integer variant the caller happened to build.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum OidKey {
    /// Signed integer identifier.
    Signed(i64),
    /// Unsigned integer identifier beyond `i64::MAX`.
    Unsigned(u64),
    /// String identifier.
    Str(String),
}

impl Any {
    /// Type tag of this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Any::Empty => PropertyType::Empty,
            Any::Bool(_) => PropertyType::Bool,
            Any::Int32(_) => PropertyType::Int32,
            Any::UInt32(_) => PropertyType::UInt32,
            Any::Int64(_) => PropertyType::Int64,
            Any::UInt64(_) => PropertyType::UInt64,
            Any::Float(_) => PropertyType::Float,
            Any::Double(_) => PropertyType::Double,
            Any::Date(_) => PropertyType::Date,
            Any::StringView(_) => PropertyType::StringView,
            Any::Record(_) => PropertyType::Record,
        }
    }

    /// Returns the fields of a record value.
    pub fn as_record(&self) -> Option<&[Any]> {
        match self {
            Any::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the identifier key, or `None` for kinds that cannot identify a vertex.
    pub fn oid_key(&self) -> Option<OidKey> {
        match self {
            Any::Int32(v) => Some(OidKey::Signed(i64::from(*v))),
            Any::Int64(v) => Some(OidKey::Signed(*v)),
            Any::UInt32(v) => Some(OidKey::Signed(i64::from(*v))),
            Any::UInt64(v) => Some(match i64::try_from(*v) {
                Ok(signed) => OidKey::Signed(signed),
                Err(_) => OidKey::Unsigned(*v),
            }),
            Any::StringView(s) => Some(OidKey::Str(s.clone())),
            _ => None,
        }
    }

    /// Appends the tagged encoding of this value.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.property_type().tag());
        match self {
            Any::Empty => {}
            Any::Bool(v) => out.push(u8::from(*v)),
            Any::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::Int64(v) | Any::Date(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            Any::StringView(s) => {
                var::encode_u64(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            Any::Record(fields) => {
                var::encode_u64(fields.len() as u64, out);
                for field in fields {
                    field.encode(out);
                }
            }
        }
    }

    /// Decodes one tagged value from the cursor.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Any> {
        decode_depth(cur, 0)
    }

    /// Skips one tagged value without materialising it.
    pub fn skip(cur: &mut Cursor<'_>) -> Result<()> {
        decode_depth(cur, 0).map(|_| ())
    }
}

fn decode_depth(cur: &mut Cursor<'_>, depth: usize) -> Result<Any> {
    let tag = cur.u8()?;
    let value = match PropertyType::from_tag(tag)? {
        PropertyType::Empty => Any::Empty,
        PropertyType::Bool => match cur.u8()? {
            0 => Any::Bool(false),
            1 => Any::Bool(true),
            _ => return Err(PenumbraError::Corruption("bool payload invalid")),
        },
        PropertyType::Int32 => Any::Int32(cur.i32_le()?),
        PropertyType::UInt32 => Any::UInt32(cur.u32_le()?),
        PropertyType::Int64 => Any::Int64(cur.i64_le()?),
        PropertyType::UInt64 => Any::UInt64(cur.u64_le()?),
        PropertyType::Float => Any::Float(cur.f32_le()?),
        PropertyType::Double => Any::Double(cur.f64_le()?),
        PropertyType::Date => Any::Date(cur.i64_le()?),
        PropertyType::StringView => {
            let len = cur.var_u64()?;
            let len = usize::try_from(len)
                .map_err(|_| PenumbraError::Corruption("string length overflow"))?;
            let bytes = cur.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| PenumbraError::Corruption("stored string not utf8"))?;
            Any::StringView(s.to_owned())
        }
        PropertyType::StringMap => {
            return Err(PenumbraError::Corruption("string_map tag on a value"))
        }
        PropertyType::Record => {
            if depth >= MAX_RECORD_DEPTH {
                return Err(PenumbraError::Corruption("record nesting too deep"));
            }
            let count = cur.var_u64()?;
            if count > cur.remaining() as u64 {
                return Err(PenumbraError::Corruption("record field count exceeds payload"));
            }
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                fields.push(decode_depth(cur, depth + 1)?);
            }
            Any::Record(fields)
        }
    };
    Ok(value)
}

impl fmt::Display for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Any::Empty => f.write_str("empty"),
            Any::Bool(v) => write!(f, "{v}"),
            Any::Int32(v) => write!(f, "{v}"),
            Any::UInt32(v) => write!(f, "{v}"),
            Any::Int64(v) => write!(f, "{v}"),
            Any::UInt64(v) => write!(f, "{v}"),
            Any::Float(v) => write!(f, "{v}"),
            Any::Double(v) => write!(f, "{v}"),
            Any::Date(v) => write!(f, "date({v})"),
            Any::StringView(v) => write!(f, "{v}"),
            Any::Record(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<i32> for Any {
    fn from(v: i32) -> Self {
        Any::Int32(v)
    }
}

impl From<i64> for Any {
    fn from(v: i64) -> Self {
        Any::Int64(v)
    }
}

impl From<u64> for Any {
    fn from(v: u64) -> Self {
        Any::UInt64(v)
    }
}

impl From<f64> for Any {
    fn from(v: f64) -> Self {
        Any::Double(v)
    }
}

impl From<bool> for Any {
    fn from(v: bool) -> Self {
        Any::Bool(v)
    }
}

impl From<&str> for Any {
    fn from(v: &str) -> Self {
        Any::StringView(v.to_owned())
    }
}

impl From<String> for Any {
    fn from(v: String) -> Self {
        Any::StringView(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Any {
        let mut cur = Cursor::new(bytes);
        let value = Any::decode(&mut cur).unwrap();
        assert!(cur.is_empty(), "trailing bytes after value");
        value
    }

    #[test]
    fn string_view_widens_into_string_map_only() {
        assert!(PropertyType::StringMap.accepts(PropertyType::StringView));
        assert!(!PropertyType::StringView.accepts(PropertyType::StringMap));
        assert!(!PropertyType::Int64.accepts(PropertyType::Int32));
        assert!(PropertyType::Int64.accepts(PropertyType::Int64));
    }

    #[test]
    fn nested_record_decodes_field_by_field() {
        let value = Any::Record(vec![
            Any::Int32(1),
            Any::StringView("since".into()),
            Any::Record(vec![Any::Bool(true), Any::Empty]),
        ]);
        let mut buf = Vec::new();
        value.encode(&mut buf);
        assert_eq!(buf[0], TAG_RECORD);
        assert_eq!(decode_all(&buf), value);
    }

    #[test]
    fn string_encoding_is_tag_varint_len_bytes() {
        let mut buf = Vec::new();
        Any::from("Alice").encode(&mut buf);
        assert_eq!(buf, [&[TAG_STRING_VIEW, 5][..], b"Alice"].concat());
    }

    #[test]
    fn decode_rejects_bad_payloads() {
        let mut cur = Cursor::new(&[TAG_BOOL, 2]);
        assert!(Any::decode(&mut cur).is_err());
        let mut cur = Cursor::new(&[TAG_STRING_MAP]);
        assert!(Any::decode(&mut cur).is_err());
        let mut cur = Cursor::new(&[0xEE]);
        assert!(Any::decode(&mut cur).is_err());
        let mut cur = Cursor::new(&[TAG_INT64, 1, 2]);
        assert!(Any::decode(&mut cur).is_err());
        let mut cur = Cursor::new(&[TAG_RECORD, 200]);
        assert!(Any::decode(&mut cur).is_err());
    }

    #[test]
    fn integer_identifiers_share_keys_across_widths() {
        assert_eq!(Any::Int32(7).oid_key(), Any::Int64(7).oid_key());
        assert_eq!(Any::UInt64(7).oid_key(), Some(OidKey::Signed(7)));
        assert_eq!(
            Any::UInt64(u64::MAX).oid_key(),
            Some(OidKey::Unsigned(u64::MAX))
        );
        assert_eq!(Any::Double(1.0).oid_key(), None);
        assert_eq!(Any::Record(vec![]).oid_key(), None);
    }

    #[test]
    fn display_renders_records() {
        let v = Any::Record(vec![Any::Int64(3), Any::from("x")]);
        assert_eq!(v.to_string(), "(3, x)");
    }
}
