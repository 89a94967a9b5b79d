//! Bounds-checked cursor over a byte slice
//!
//! Every decoder in this crate reads through [`BinaryCursor`]. The cursor borrows the
//! underlying buffer, so decoded views never outlive the bytes they point into.
//!
//! Two families of reads are offered:
//! - [`BinaryCursor::read`] / [`BinaryCursor::peek`] clamp at the end of the buffer and
//!   return whatever is left, never failing.
//! - Typed reads (`read_u32`, `read_exact`, ...) need the full width to be available and
//!   return [`Error::OutOfRange`] otherwise, leaving the position untouched.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::SeekFrom;

use crate::error::{Error, Result};

/// Byte order for reads that are not fixed little endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

macro_rules! le_reader {
    ($name:ident, $ty:ty, $width:expr, $conv:ident) => {
        #[doc = concat!("Read a little-endian `", stringify!($ty), "`")]
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.read_exact($width)?;
            Ok(LittleEndian::$conv(bytes))
        }
    };
}

/// A read/seek/peek cursor that can never step outside its buffer
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a cursor positioned at `offset`
    pub fn at(data: &'a [u8], offset: u64) -> Result<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(SeekFrom::Start(offset))?;
        Ok(cursor)
    }

    /// The whole underlying buffer
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position
    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    /// Bytes left between the position and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read up to `n` bytes, returning fewer if the buffer ends first
    pub fn read(&mut self, n: usize) -> &'a [u8] {
        let out = self.peek(n);
        self.pos += out.len();
        out
    }

    /// Like [`read`](Self::read) but without advancing
    pub fn peek(&self, n: usize) -> &'a [u8] {
        let end = self.pos.saturating_add(n).min(self.data.len());
        &self.data[self.pos..end]
    }

    /// Move the position. Landing exactly on the end of the buffer is allowed.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        let len = self.data.len() as i128;
        let target = match from {
            SeekFrom::Start(off) => off as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => len + delta as i128,
        };
        if target < 0 || target > len {
            return Err(Error::OutOfRange {
                offset: target.max(0) as u64,
                len: 0,
            });
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    /// Advance by `n` bytes, failing if that would pass the end
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(SeekFrom::Current(n as i64)).map(|_| ())
    }

    /// Read exactly `n` bytes or fail without moving
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::OutOfRange {
                offset: self.pos as u64,
                len: n as u64,
            });
        }
        Ok(self.read(n))
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    le_reader!(read_u16, u16, 2, read_u16);
    le_reader!(read_u32, u32, 4, read_u32);
    le_reader!(read_u64, u64, 8, read_u64);
    le_reader!(read_i16, i16, 2, read_i16);
    le_reader!(read_i32, i32, 4, read_i32);
    le_reader!(read_i64, i64, 8, read_i64);
    le_reader!(read_f32, f32, 4, read_f32);
    le_reader!(read_f64, f64, 8, read_f64);

    /// Read an `i16` in the given byte order
    pub fn read_i16_with(&mut self, endian: Endian) -> Result<i16> {
        let bytes = self.read_exact(2)?;
        Ok(match endian {
            Endian::Little => LittleEndian::read_i16(bytes),
            Endian::Big => BigEndian::read_i16(bytes),
        })
    }

    /// Read an `i32` in the given byte order
    pub fn read_i32_with(&mut self, endian: Endian) -> Result<i32> {
        let bytes = self.read_exact(4)?;
        Ok(match endian {
            Endian::Little => LittleEndian::read_i32(bytes),
            Endian::Big => BigEndian::read_i32(bytes),
        })
    }

    /// Read a NUL-padded string occupying exactly `n` bytes
    pub fn read_fixed_str(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_exact(n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a NUL-terminated string; the terminator is consumed but not returned.
    /// An unterminated string runs to the end of the buffer.
    pub fn read_cstring(&mut self) -> String {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += (end + 1).min(rest.len());
        s
    }
}

/// Read a NUL-terminated string starting at `offset`, empty when out of range
pub fn cstring_at(data: &[u8], offset: usize) -> String {
    match data.get(offset..) {
        Some(rest) => {
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            String::from_utf8_lossy(&rest[..end]).into_owned()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_is_clamped() {
        let data = [1u8, 2, 3, 4, 5];
        let mut cursor = BinaryCursor::new(&data);
        cursor.seek(SeekFrom::Start(3)).unwrap();
        assert_eq!(cursor.read(10), &[4, 5]);
        assert_eq!(cursor.tell(), 5);
        assert!(cursor.read(1).is_empty());
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [9u8, 8, 7];
        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.peek(2), &[9, 8]);
        assert_eq!(cursor.tell(), 0);
        assert_eq!(cursor.read(2), &[9, 8]);
        assert_eq!(cursor.peek(5), &[7]);
    }

    #[test]
    fn test_seek_bounds() {
        let data = [0u8; 8];
        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.seek(SeekFrom::Start(8)).unwrap(), 8);
        assert!(cursor.is_eof());
        assert!(matches!(
            cursor.seek(SeekFrom::Start(9)),
            Err(Error::OutOfRange { .. })
        ));
        assert!(cursor.seek(SeekFrom::End(1)).is_err());
        assert!(cursor.seek(SeekFrom::Current(-9)).is_err());
        assert_eq!(cursor.seek(SeekFrom::End(-2)).unwrap(), 6);
        assert_eq!(cursor.seek(SeekFrom::Current(-6)).unwrap(), 0);
    }

    #[test]
    fn test_typed_reads() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0x12345678);
        assert_eq!(cursor.read_i8().unwrap(), -1);
    }

    #[test]
    fn test_short_typed_read_fails_without_moving() {
        let data = [1u8, 2, 3];
        let mut cursor = BinaryCursor::new(&data);
        cursor.skip(1).unwrap();
        assert!(cursor.read_u32().is_err());
        assert_eq!(cursor.tell(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0302);
    }

    #[test]
    fn test_endian_reads() {
        let data = [0x00, 0x00, 0x01, 0x00];
        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.read_i32_with(Endian::Big).unwrap(), 0x100);
        cursor.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(cursor.read_i32_with(Endian::Little).unwrap(), 0x10000);
    }

    #[test]
    fn test_strings() {
        let data = b"abc\0def\0\0\0xyz";
        let mut cursor = BinaryCursor::new(data);
        assert_eq!(cursor.read_cstring(), "abc");
        assert_eq!(cursor.read_fixed_str(6).unwrap(), "def");
        assert_eq!(cursor.read_cstring(), "xyz");
        assert!(cursor.is_eof());
        assert_eq!(cstring_at(data, 4), "def");
        assert_eq!(cstring_at(data, 100), "");
    }
}
