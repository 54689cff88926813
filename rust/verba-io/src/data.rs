//! Primitive encodings shared by every segment file.
//!
//! Variable-length integers store 7 bits per byte, least-significant group first,
//! with the high bit set on every byte but the last. Fixed-width integers are
//! big-endian. Strings are a vint count of UTF-16 code units followed by the
//! units in "modified UTF-8" (`0x0000` takes two bytes, surrogates are encoded
//! individually).

use byteorder::{BigEndian, ByteOrder};

use crate::{IndexInput, IndexOutput};

/// Encoding helpers available on every [`IndexOutput`].
pub trait DataOutput: IndexOutput {
    fn write_vint(&mut self, mut value: u32) -> std::io::Result<()> {
        while value & !0x7F != 0 {
            self.write_byte(((value & 0x7F) | 0x80) as u8)?;
            value >>= 7;
        }
        self.write_byte(value as u8)
    }

    fn write_vlong(&mut self, mut value: u64) -> std::io::Result<()> {
        while value & !0x7F != 0 {
            self.write_byte(((value & 0x7F) | 0x80) as u8)?;
            value >>= 7;
        }
        self.write_byte(value as u8)
    }

    fn write_int(&mut self, value: i32) -> std::io::Result<()> {
        let mut buf = [0u8; 4];
        BigEndian::write_i32(&mut buf, value);
        self.write_bytes(&buf)
    }

    fn write_long(&mut self, value: i64) -> std::io::Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, value);
        self.write_bytes(&buf)
    }

    fn write_string(&mut self, s: &str) -> std::io::Result<()> {
        let units = s.encode_utf16().collect::<Vec<_>>();
        self.write_vint(units.len() as u32)?;
        self.write_chars(&units)
    }

    /// Writes the code units without a length prefix.
    fn write_chars(&mut self, units: &[u16]) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(units.len());
        encode_modified_utf8(units, &mut buf);
        self.write_bytes(&buf)
    }
}

impl<T: IndexOutput + ?Sized> DataOutput for T {}

/// Decoding helpers available on every [`IndexInput`].
pub trait DataInput: IndexInput {
    fn read_vint(&mut self) -> std::io::Result<u32> {
        let mut b = self.read_byte()?;
        let mut value = (b & 0x7F) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 28 {
                return Err(invalid_data("vint is too long"));
            }
            b = self.read_byte()?;
            value |= ((b & 0x7F) as u32) << shift;
            shift += 7;
        }
        Ok(value)
    }

    fn read_vlong(&mut self) -> std::io::Result<u64> {
        let mut b = self.read_byte()?;
        let mut value = (b & 0x7F) as u64;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 63 {
                return Err(invalid_data("vlong is too long"));
            }
            b = self.read_byte()?;
            value |= ((b & 0x7F) as u64) << shift;
            shift += 7;
        }
        Ok(value)
    }

    fn read_int(&mut self) -> std::io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(BigEndian::read_i32(&buf))
    }

    fn read_long(&mut self) -> std::io::Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    fn read_string(&mut self) -> std::io::Result<String> {
        let len = self.read_vint()? as usize;
        let mut units = Vec::with_capacity(len);
        self.read_chars(len, &mut units)?;
        Ok(String::from_utf16_lossy(&units))
    }

    /// Appends `count` code units to `units`.
    fn read_chars(&mut self, count: usize, units: &mut Vec<u16>) -> std::io::Result<()> {
        for _ in 0..count {
            let b = self.read_byte()? as u16;
            let unit = if b & 0x80 == 0 {
                b
            } else if b & 0xE0 != 0xE0 {
                ((b & 0x1F) << 6) | (self.read_byte()? as u16 & 0x3F)
            } else {
                let b2 = self.read_byte()? as u16;
                let b3 = self.read_byte()? as u16;
                ((b & 0x0F) << 12) | ((b2 & 0x3F) << 6) | (b3 & 0x3F)
            };
            units.push(unit);
        }
        Ok(())
    }
}

impl<T: IndexInput + ?Sized> DataInput for T {}

pub fn encode_modified_utf8(units: &[u16], out: &mut Vec<u8>) {
    for &unit in units {
        match unit {
            0x01..=0x7F => out.push(unit as u8),
            0x00 | 0x80..=0x7FF => {
                out.push((0xC0 | (unit >> 6)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
            _ => {
                out.push((0xE0 | (unit >> 12)) as u8);
                out.push((0x80 | ((unit >> 6) & 0x3F)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
        }
    }
}

fn invalid_data(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod tests {
    use crate::{IndexInput, IndexOutput, MemoryOutput};

    use super::{DataInput, DataOutput};

    #[test]
    fn test_vint_layout() {
        let mut out = MemoryOutput::new();
        out.write_vint(0).unwrap();
        out.write_vint(127).unwrap();
        out.write_vint(128).unwrap();
        out.write_vint(16_384).unwrap();
        assert_eq!(out.as_bytes(), &[0x00, 0x7F, 0x80, 0x01, 0x80, 0x80, 0x01]);

        let mut input = out.to_input();
        assert_eq!(input.read_vint().unwrap(), 0);
        assert_eq!(input.read_vint().unwrap(), 127);
        assert_eq!(input.read_vint().unwrap(), 128);
        assert_eq!(input.read_vint().unwrap(), 16_384);
        assert_eq!(input.file_pointer(), input.length());
    }

    #[test]
    fn test_fixed_width_is_big_endian() {
        let mut out = MemoryOutput::new();
        out.write_int(-3).unwrap();
        out.write_long(0x0102_0304_0506_0708).unwrap();
        assert_eq!(&out.as_bytes()[..4], &[0xFF, 0xFF, 0xFF, 0xFD]);
        assert_eq!(&out.as_bytes()[4..], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut input = out.to_input();
        assert_eq!(input.read_int().unwrap(), -3);
        assert_eq!(input.read_long().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_modified_utf8_strings() {
        let mut out = MemoryOutput::new();
        out.write_string("a\u{0}é€😀").unwrap();
        out.write_string("").unwrap();
        let bytes = out.as_bytes();
        // six UTF-16 units, the emoji being a surrogate pair
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..4], &[b'a', 0xC0, 0x80]);

        let mut input = out.to_input();
        assert_eq!(input.read_string().unwrap(), "a\u{0}é€😀");
        assert_eq!(input.read_string().unwrap(), "");
    }
}
