use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;

use crate::core::error::{Error, Result};

/// Backing storage for an [`InStream`]. Reads are positioned, so clones of
/// one stream never contend on a shared cursor.
pub trait ReadSource: Send + Sync {
    fn len(&self) -> u64;

    /// Fill `buf` starting at `offset`; the full range must be present.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

pub struct BytesSource(pub Bytes);

impl ReadSource for BytesSource {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.0.len() {
            return Err(Error::io(format!(
                "Read past EOF: {} > {}",
                end,
                self.0.len()
            )));
        }
        buf.copy_from_slice(&self.0[start..end]);
        Ok(())
    }
}

pub struct MmapSource(pub Mmap);

impl ReadSource for MmapSource {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.0.len() {
            return Err(Error::io(format!(
                "Read past EOF: {} > {}",
                end,
                self.0.len()
            )));
        }
        buf.copy_from_slice(&self.0[start..end]);
        Ok(())
    }
}

/// Positioned reader over a window of a shared file handle. `reopen` makes
/// a bounded view sharing the same handle, each view with its own cursor.
pub struct InStream {
    path: String,
    source: Arc<dyn ReadSource>,
    window_offset: u64,
    window_len: u64,
    pos: u64,
}

impl InStream {
    pub fn new(path: impl Into<String>, source: Arc<dyn ReadSource>) -> Self {
        let window_len = source.len();
        InStream {
            path: path.into(),
            source,
            window_offset: 0,
            window_len,
            pos: 0,
        }
    }

    /// Bounded view over `[offset, offset + len)` of this stream's window,
    /// sharing the underlying handle.
    pub fn reopen(&self, path: impl Into<String>, offset: u64, len: u64) -> Result<InStream> {
        let path = path.into();
        if offset + len > self.window_len {
            return Err(Error::io(format!(
                "Window [{}, {}) exceeds '{}' ({} bytes)",
                offset,
                offset + len,
                self.path,
                self.window_len
            )));
        }
        Ok(InStream {
            path,
            source: Arc::clone(&self.source),
            window_offset: self.window_offset + offset,
            window_len: len,
            pos: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.window_len
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.window_len - self.pos
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.window_len {
            return Err(Error::io(format!(
                "Seek to {} past end of '{}' ({} bytes)",
                pos, self.path, self.window_len
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.pos + buf.len() as u64 > self.window_len {
            return Err(Error::io(format!(
                "Read past EOF of '{}' (pos {}, len {}, wanted {})",
                self.path,
                self.pos,
                self.window_len,
                buf.len()
            )));
        }
        self.source.read_at(self.window_offset + self.pos, buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Slurp the whole window.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.seek(0)?;
        let mut buf = vec![0u8; self.window_len as usize];
        self.read_bytes(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(f32::from_be_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Variable-length u32: 7 bits per byte, low bits first, high bit set on
    /// every byte except the last.
    pub fn read_c32(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let byte = self
                .read_u8()
                .map_err(|e| Error::decode(format!("Incomplete C32 in '{}': {}", self.path, e.message)))?;
            value |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 28 {
                return Err(Error::decode(format!("C32 overflow in '{}'", self.path)));
            }
        }
    }

    pub fn read_c64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self
                .read_u8()
                .map_err(|e| Error::decode(format!("Incomplete C64 in '{}': {}", self.path, e.message)))?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::decode(format!("C64 overflow in '{}'", self.path)));
            }
        }
    }

    /// C32 byte length followed by UTF-8 data, validated on the way in.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_c32()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| Error::decode(format!("Invalid UTF-8 in '{}'", self.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_over(data: Vec<u8>) -> InStream {
        InStream::new("test", Arc::new(BytesSource(Bytes::from(data))))
    }

    #[test]
    fn fixed_width_big_endian() {
        let mut stream = stream_over(vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(stream.read_u32().unwrap(), 0x12345678);
        assert!(stream.read_u8().is_err());
    }

    #[test]
    fn c32_encoding_is_low_bits_first() {
        // 300 = 0b100101100 -> 0xac 0x02
        let mut stream = stream_over(vec![0xac, 0x02]);
        assert_eq!(stream.read_c32().unwrap(), 300);
    }

    #[test]
    fn c32_rejects_overlong_runs() {
        let mut stream = stream_over(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(stream.read_c32().is_err());
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut stream = stream_over(vec![0x02, 0xff, 0xfe]);
        assert!(stream.read_string().is_err());
    }

    #[test]
    fn reopen_bounds_window() {
        let mut stream = stream_over(vec![1, 2, 3, 4, 5, 6]);
        let mut window = stream.reopen("sub", 2, 3).unwrap();
        assert_eq!(window.length(), 3);
        assert_eq!(window.read_u8().unwrap(), 3);
        assert_eq!(window.read_u8().unwrap(), 4);
        assert_eq!(window.read_u8().unwrap(), 5);
        assert!(window.read_u8().is_err());
        assert!(stream.reopen("sub", 4, 3).is_err());
        // The parent cursor is untouched by window reads.
        assert_eq!(stream.read_u8().unwrap(), 1);
    }
}
