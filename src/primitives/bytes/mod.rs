#![forbid(unsafe_code)]
//! Varint and little-endian helpers plus the cursor used to walk log records.

pub mod var {
    //! Unsigned LEB128 varints.

    use crate::types::{PenumbraError, Result};

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let Some(&byte) = src.get(*off) else {
                return Err(PenumbraError::Corruption("varint truncated"));
            };
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if i == 9 && payload > 1 {
                return Err(PenumbraError::Corruption("varint overflow"));
            }
            result |= payload << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(PenumbraError::Corruption("varint too long"))
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing records.

    use core::fmt;

    use super::var;
    use crate::types::{PenumbraError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    ///
    /// Every read fails with [`PenumbraError::Corruption`] instead of reading
    /// past the end of the slice.
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    macro_rules! read_le {
        ($name:ident, $ty:ty, $what:literal) => {
            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self) -> Result<$ty> {
                const N: usize = core::mem::size_of::<$ty>();
                let bytes = self.take_or(N, $what)?;
                let mut arr = [0u8; N];
                arr.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(arr))
            }
        };
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            self.take_or(n, "cursor take beyond buffer")
        }

        fn take_or(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or(PenumbraError::Corruption(what))?;
            if end > self.buf.len() {
                return Err(PenumbraError::Corruption(what));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take_or(1, "u8 truncated")?[0])
        }

        read_le!(u32_le, u32, "u32 truncated");
        read_le!(i32_le, i32, "i32 truncated");
        read_le!(u64_le, u64, "u64 truncated");
        read_le!(i64_le, i64, "i64 truncated");
        read_le!(f32_le, f32, "f32 truncated");
        read_le!(f64_le, f64, "f64 truncated");

        /// Reads an unsigned varint.
        pub fn var_u64(&mut self) -> Result<u64> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Returns `true` once every byte has been consumed.
        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }

        /// Current read offset.
        pub fn position(&self) -> usize {
            self.off
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{buf::Cursor, var};
    use proptest::prelude::*;

    #[test]
    fn varint_roundtrip_edges() {
        let mut buf = Vec::new();
        var::encode_u64(0, &mut buf);
        let mut off = 0;
        assert_eq!(var::decode_u64(&buf, &mut off).unwrap(), 0);
        assert_eq!(off, buf.len());

        buf.clear();
        var::encode_u64(u64::MAX, &mut buf);
        off = 0;
        assert_eq!(var::decode_u64(&buf, &mut off).unwrap(), u64::MAX);
        assert_eq!(off, buf.len());
    }

    #[test]
    fn cursor_reads_fixed_width_little_endian() {
        let mut data = Vec::new();
        data.push(7u8);
        data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data.extend_from_slice(&(-5i64).to_le_bytes());
        data.extend_from_slice(&1.5f64.to_le_bytes());
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.u8().unwrap(), 7);
        assert_eq!(cur.u32_le().unwrap(), 0xDEAD_BEEF);
        assert_eq!(cur.i64_le().unwrap(), -5);
        assert_eq!(cur.f64_le().unwrap(), 1.5);
        assert!(cur.is_empty());
    }

    #[test]
    fn cursor_take_rejects_overread() {
        let mut cur = Cursor::new(&[1, 2, 3]);
        assert!(cur.take(4).is_err());
        assert_eq!(cur.position(), 0);
        assert_eq!(cur.take(3).unwrap(), &[1, 2, 3]);
        assert!(cur.u8().is_err());
    }

    #[test]
    fn varint_decode_rejects_truncated() {
        let data = vec![0x80];
        let mut off = 0;
        assert!(var::decode_u64(&data, &mut off).is_err());
    }

    #[test]
    fn varint_decode_rejects_too_long() {
        let data = vec![0x81; 11];
        let mut off = 0;
        assert!(var::decode_u64(&data, &mut off).is_err());
    }

    proptest! {
        #[test]
        fn varint_roundtrip_prop(xs in proptest::collection::vec(any::<u64>(), 1..64)) {
            let mut buf = Vec::new();
            for &x in &xs {
                var::encode_u64(x, &mut buf);
            }
            let mut cur = Cursor::new(&buf);
            for &x in &xs {
                prop_assert_eq!(cur.var_u64().unwrap(), x);
            }
            prop_assert!(cur.is_empty());
        }
    }
}
