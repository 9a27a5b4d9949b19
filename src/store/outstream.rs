use crate::core::error::{Error, Result};

const FLUSH_THRESHOLD: usize = 4096;

/// Destination for an [`OutStream`]'s bytes. `finish` publishes the file;
/// for RAM folders nothing is visible until then.
pub trait WriteSink: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    fn finish(&mut self, sync: bool) -> Result<()>;
}

/// Buffered writer with a running byte count backing `tell`.
pub struct OutStream {
    path: String,
    sink: Box<dyn WriteSink>,
    buf: Vec<u8>,
    flushed: u64,
    closed: bool,
}

impl OutStream {
    pub fn new(path: impl Into<String>, sink: Box<dyn WriteSink>) -> Self {
        OutStream {
            path: path.into(),
            sink,
            buf: Vec::with_capacity(FLUSH_THRESHOLD),
            flushed: 0,
            closed: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tell(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    fn flush_buf(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.sink.write_all(&self.buf)?;
            self.flushed += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.do_close(false)
    }

    /// Close and fsync; used for files whose durability gates a commit.
    pub fn close_sync(&mut self) -> Result<()> {
        self.do_close(true)
    }

    fn do_close(&mut self, sync: bool) -> Result<()> {
        if self.closed {
            return Err(Error::io(format!("'{}' already closed", self.path)));
        }
        self.flush_buf()?;
        self.sink.finish(sync)?;
        self.closed = true;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_buf()?;
        }
        Ok(())
    }

    /// Zero-pad until `tell` is a multiple of `modulus`.
    pub fn align(&mut self, modulus: u64) -> Result<u64> {
        if modulus == 0 {
            return Err(Error::bad_argument("Alignment modulus of zero"));
        }
        while self.tell() % modulus != 0 {
            self.write_u8(0)?;
        }
        Ok(self.tell())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_c32(&mut self, mut value: u32) -> Result<()> {
        while value >= 0x80 {
            self.write_u8((value & 0x7f) as u8 | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    pub fn write_c64(&mut self, mut value: u64) -> Result<()> {
        while value >= 0x80 {
            self.write_u8((value & 0x7f) as u8 | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_c32(value.len() as u32)?;
        self.write_bytes(value.as_bytes())
    }
}

impl Drop for OutStream {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.do_close(false);
        }
    }
}

/// Sink that discards nothing and publishes through a callback; used by
/// RAM folders and tests.
pub struct VecSink {
    data: Vec<u8>,
    publish: Box<dyn FnMut(Vec<u8>) -> Result<()> + Send>,
}

impl VecSink {
    pub fn new(publish: Box<dyn FnMut(Vec<u8>) -> Result<()> + Send>) -> Self {
        VecSink {
            data: Vec::new(),
            publish,
        }
    }
}

impl WriteSink for VecSink {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self, _sync: bool) -> Result<()> {
        (self.publish)(std::mem::take(&mut self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::instream::{BytesSource, InStream};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::mpsc;

    fn capture() -> (OutStream, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let sink = VecSink::new(Box::new(move |data| {
            tx.send(data).map_err(|e| Error::internal(e.to_string()))
        }));
        (OutStream::new("test", Box::new(sink)), rx)
    }

    fn written(out: &mut OutStream, rx: &mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
        out.close().unwrap();
        rx.recv().unwrap()
    }

    #[test]
    fn tell_tracks_buffered_bytes() {
        let (mut out, rx) = capture();
        out.write_u32(7).unwrap();
        out.write_string("abc").unwrap();
        assert_eq!(out.tell(), 8);
        assert_eq!(written(&mut out, &rx).len(), 8);
    }

    #[test]
    fn numeric_round_trip() {
        let (mut out, rx) = capture();
        out.write_i64(-42).unwrap();
        out.write_f64(2.5).unwrap();
        out.write_c32(300).unwrap();
        out.write_c64(1 << 40).unwrap();
        out.write_string("skald").unwrap();
        let data = written(&mut out, &rx);

        let mut stream = InStream::new("test", Arc::new(BytesSource(Bytes::from(data))));
        assert_eq!(stream.read_i64().unwrap(), -42);
        assert_eq!(stream.read_f64().unwrap(), 2.5);
        assert_eq!(stream.read_c32().unwrap(), 300);
        assert_eq!(stream.read_c64().unwrap(), 1 << 40);
        assert_eq!(stream.read_string().unwrap(), "skald");
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn align_pads_with_zeros() {
        let (mut out, rx) = capture();
        out.write_u8(7).unwrap();
        assert_eq!(out.align(8).unwrap(), 8);
        out.write_u8(9).unwrap();
        let data = written(&mut out, &rx);
        assert_eq!(data, vec![7, 0, 0, 0, 0, 0, 0, 0, 9]);
        assert!(OutStream::new("x", Box::new(VecSink::new(Box::new(|_| Ok(())))))
            .align(0)
            .is_err());
    }

    #[test]
    fn double_close_is_an_error() {
        let (mut out, _rx) = capture();
        out.close().unwrap();
        assert!(out.close().is_err());
    }
}
