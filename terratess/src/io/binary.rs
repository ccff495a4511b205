//! Binary stream adapter.
//!
//! Values are written with an explicit byte order so that files are portable
//! across hosts. Readers recover the byte order from the flag recorded in
//! the file header and adapt; they never assume host order. Both adapter
//! halves track the current byte offset so truncation faults can report
//! where the stream ended.

use std::io::{Read, Write};

use super::StreamError;

/// Byte order of a binary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least-significant byte first.
    #[default]
    Little,
    /// Most-significant byte first.
    Big,
}

impl ByteOrder {
    /// Flag byte stored in file headers.
    pub fn flag(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    /// Decode a header flag byte.
    pub fn from_flag(flag: u8) -> Option<ByteOrder> {
        match flag {
            0 => Some(ByteOrder::Little),
            1 => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Writes primitive values to a byte sink in a fixed byte order.
pub struct BinaryWriter<W: Write> {
    sink: W,
    order: ByteOrder,
    position: u64,
}

impl<W: Write> BinaryWriter<W> {
    /// Create a writer with the given byte order.
    pub fn new(sink: W, order: ByteOrder) -> Self {
        Self {
            sink,
            order,
            position: 0,
        }
    }

    /// Byte order this writer emits.
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write raw bytes verbatim.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_bytes(&[value])
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), StreamError> {
        let bytes = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write_bytes(&bytes)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), StreamError> {
        let bytes = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write_bytes(&bytes)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), StreamError> {
        let bytes = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write_bytes(&bytes)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), StreamError> {
        let bytes = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write_bytes(&bytes)
    }

    /// Write a length-prefixed UTF-8 string (i32 byte count + bytes).
    pub fn write_string(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_i32(value.len() as i32)?;
        self.write_bytes(value.as_bytes())
    }

    /// Pad with zero bytes to the next `alignment`-byte boundary, so fixed
    /// width numeric tables start word-aligned. No-op when already aligned.
    pub fn align(&mut self, alignment: u64) -> Result<(), StreamError> {
        while self.position % alignment != 0 {
            self.write_u8(0)?;
        }
        Ok(())
    }

    pub fn write_i32_array(&mut self, values: &[i32]) -> Result<(), StreamError> {
        for &v in values {
            self.write_i32(v)?;
        }
        Ok(())
    }

    pub fn write_f64_array(&mut self, values: &[f64]) -> Result<(), StreamError> {
        for &v in values {
            self.write_f64(v)?;
        }
        Ok(())
    }

    /// Flush the sink and return it.
    pub fn finish(mut self) -> Result<W, StreamError> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Reads primitive values from a byte source.
///
/// The byte order may be switched mid-stream once the header flag has been
/// read; everything after the flag is decoded in the recorded order.
pub struct BinaryReader<R: Read> {
    source: R,
    order: ByteOrder,
    position: u64,
}

impl<R: Read> BinaryReader<R> {
    /// Create a reader. The initial order only matters for bytes read
    /// before [`set_order`](Self::set_order) is called.
    pub fn new(source: R, order: ByteOrder) -> Self {
        Self {
            source,
            order,
            position: 0,
        }
    }

    /// Switch the decode order, normally right after reading a header flag.
    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read exactly `buf.len()` bytes, reporting truncation with the offset
    /// at which the stream ended.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        match self.source.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(StreamError::Truncated {
                offset: self.position,
            }),
            Err(e) => Err(StreamError::Io(e)),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Little => i32::from_le_bytes(buf),
            ByteOrder::Big => i32::from_be_bytes(buf),
        })
    }

    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Little => i64::from_le_bytes(buf),
            ByteOrder::Big => i64::from_be_bytes(buf),
        })
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Little => f32::from_le_bytes(buf),
            ByteOrder::Big => f32::from_be_bytes(buf),
        })
    }

    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Little => f64::from_le_bytes(buf),
            ByteOrder::Big => f64::from_be_bytes(buf),
        })
    }

    /// Read a non-negative count written as i32.
    pub fn read_count(&mut self) -> Result<usize, StreamError> {
        let offset = self.position;
        let n = self.read_i32()?;
        if n < 0 {
            return Err(StreamError::InvalidLength {
                length: n as i64,
                offset,
            });
        }
        Ok(n as usize)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let offset = self.position;
        let len = self.read_count()?;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| StreamError::InvalidUtf8 { offset })
    }

    /// Skip the padding inserted by [`BinaryWriter::align`].
    pub fn align(&mut self, alignment: u64) -> Result<(), StreamError> {
        while self.position % alignment != 0 {
            self.read_u8()?;
        }
        Ok(())
    }

    /// Discard `count` bytes, e.g. to step over a fixed-size record.
    pub fn skip(&mut self, count: u64) -> Result<(), StreamError> {
        let mut remaining = count;
        let mut chunk = [0u8; 256];
        while remaining > 0 {
            let take = remaining.min(chunk.len() as u64) as usize;
            self.read_bytes(&mut chunk[..take])?;
            remaining -= take as u64;
        }
        Ok(())
    }

    pub fn read_i32_array(&mut self, count: usize) -> Result<Vec<i32>, StreamError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_i32()?);
        }
        Ok(values)
    }

    pub fn read_f64_array(&mut self, count: usize) -> Result<Vec<f64>, StreamError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_f64()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(order: ByteOrder) {
        let mut writer = BinaryWriter::new(Vec::new(), order);
        writer.write_u8(7).unwrap();
        writer.write_i32(-123456).unwrap();
        writer.write_i64(1 << 40).unwrap();
        writer.write_f64(std::f64::consts::PI).unwrap();
        writer.write_string("tessellation").unwrap();
        writer.write_f64_array(&[1.5, -2.5, 0.0]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice(), order);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_i32().unwrap(), -123456);
        assert_eq!(reader.read_i64().unwrap(), 1 << 40);
        assert_eq!(reader.read_f64().unwrap(), std::f64::consts::PI);
        assert_eq!(reader.read_string().unwrap(), "tessellation");
        assert_eq!(reader.read_f64_array(3).unwrap(), vec![1.5, -2.5, 0.0]);
        assert_eq!(reader.position(), bytes.len() as u64);
    }

    #[test]
    fn test_round_trip_little_endian() {
        round_trip(ByteOrder::Little);
    }

    #[test]
    fn test_round_trip_big_endian() {
        round_trip(ByteOrder::Big);
    }

    #[test]
    fn test_byte_orders_differ_on_disk() {
        let mut le = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        le.write_i32(1).unwrap();
        let mut be = BinaryWriter::new(Vec::new(), ByteOrder::Big);
        be.write_i32(1).unwrap();
        assert_ne!(le.finish().unwrap(), be.finish().unwrap());
    }

    #[test]
    fn test_truncated_stream_reports_offset() {
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        writer.write_i32(42).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(&bytes[..2], ByteOrder::Little);
        let err = reader.read_i32().unwrap_err();
        assert!(
            matches!(err, StreamError::Truncated { offset: 0 }),
            "expected truncation at offset 0, got {err:?}"
        );
    }

    #[test]
    fn test_negative_string_length_rejected() {
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        writer.write_i32(-5).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice(), ByteOrder::Little);
        let err = reader.read_string().unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidLength {
                length: -5,
                offset: 0
            }
        ));
    }

    #[test]
    fn test_alignment_pads_and_skips_symmetrically() {
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        writer.write_bytes(b"abc").unwrap();
        writer.align(8).unwrap();
        assert_eq!(writer.position(), 8);
        writer.write_f64(2.5).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice(), ByteOrder::Little);
        let mut head = [0u8; 3];
        reader.read_bytes(&mut head).unwrap();
        reader.align(8).unwrap();
        assert_eq!(reader.read_f64().unwrap(), 2.5);

        // Already aligned: no padding is added.
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        writer.write_i64(1).unwrap();
        writer.align(8).unwrap();
        assert_eq!(writer.position(), 8);
    }

    #[test]
    fn test_skip_steps_over_records() {
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Little);
        writer.write_f64(1.0).unwrap();
        writer.write_f64(2.0).unwrap();
        writer.write_i32(3).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice(), ByteOrder::Little);
        reader.skip(16).unwrap();
        assert_eq!(reader.position(), 16);
        assert_eq!(reader.read_i32().unwrap(), 3);

        let mut reader = BinaryReader::new(bytes.as_slice(), ByteOrder::Little);
        assert!(matches!(
            reader.skip(1000).unwrap_err(),
            StreamError::Truncated { .. }
        ));
    }

    #[test]
    fn test_order_switch_mid_stream() {
        // Header byte written order-independently, payload in big endian.
        let mut writer = BinaryWriter::new(Vec::new(), ByteOrder::Big);
        writer.write_u8(ByteOrder::Big.flag()).unwrap();
        writer.write_i32(99).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice(), ByteOrder::Little);
        let flag = reader.read_u8().unwrap();
        reader.set_order(ByteOrder::from_flag(flag).unwrap());
        assert_eq!(reader.read_i32().unwrap(), 99);
    }
}
