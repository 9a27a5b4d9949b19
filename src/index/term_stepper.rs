use crate::core::error::Result;
use crate::index::term_info::TermInfo;
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;

/// Prefix-compression state machine for sorted terms. A delta record is
/// the byte overlap with the previous term plus the new suffix; a key
/// frame is the full term, resetting the state for random access.
#[derive(Debug, Default)]
pub struct TermStepper {
    value: String,
}

impl TermStepper {
    pub fn new() -> Self {
        TermStepper::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn reset(&mut self) {
        self.value.clear();
    }

    pub fn set_value(&mut self, value: &str) {
        self.value.clear();
        self.value.push_str(value);
    }

    pub fn write_key_frame(&mut self, out: &mut OutStream, term: &str) -> Result<()> {
        out.write_string(term)?;
        self.set_value(term);
        Ok(())
    }

    pub fn write_delta(&mut self, out: &mut OutStream, term: &str) -> Result<()> {
        let overlap = common_prefix(self.value.as_bytes(), term.as_bytes(), term);
        out.write_c32(overlap as u32)?;
        out.write_string(&term[overlap..])?;
        self.set_value(term);
        Ok(())
    }

    pub fn read_key_frame(&mut self, stream: &mut InStream) -> Result<()> {
        self.value = stream.read_string()?;
        Ok(())
    }

    pub fn read_delta(&mut self, stream: &mut InStream) -> Result<()> {
        let overlap = stream.read_c32()? as usize;
        let suffix = stream.read_string()?;
        self.value.truncate(overlap);
        self.value.push_str(&suffix);
        Ok(())
    }
}

/// Shared byte prefix length, backed off to a char boundary so the suffix
/// stays valid UTF-8. Identical prefixes share boundaries, so backing off
/// against `term` suffices.
fn common_prefix(a: &[u8], b: &[u8], term: &str) -> usize {
    let mut len = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    while len > 0 && !term.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Companion stepper for [`TermInfo`] records. Key frames carry absolute
/// values; deltas compress the file pointers against the previous entry.
#[derive(Debug, Default)]
pub struct TermInfoStepper {
    value: TermInfo,
}

impl TermInfoStepper {
    pub fn new() -> Self {
        TermInfoStepper::default()
    }

    pub fn value(&self) -> TermInfo {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = TermInfo::default();
    }

    pub fn set_value(&mut self, value: TermInfo) {
        self.value = value;
    }

    pub fn write_key_frame(&mut self, out: &mut OutStream, tinfo: TermInfo) -> Result<()> {
        out.write_c32(tinfo.doc_freq)?;
        out.write_c64(tinfo.post_offset)?;
        out.write_c64(tinfo.skip_offset)?;
        self.value = tinfo;
        Ok(())
    }

    pub fn write_delta(&mut self, out: &mut OutStream, tinfo: TermInfo) -> Result<()> {
        out.write_c32(tinfo.doc_freq)?;
        out.write_c64(tinfo.post_offset - self.value.post_offset)?;
        out.write_c64(tinfo.skip_offset - self.value.skip_offset)?;
        self.value = tinfo;
        Ok(())
    }

    pub fn read_key_frame(&mut self, stream: &mut InStream) -> Result<()> {
        self.value = TermInfo {
            doc_freq: stream.read_c32()?,
            post_offset: stream.read_c64()?,
            skip_offset: stream.read_c64()?,
        };
        Ok(())
    }

    pub fn read_delta(&mut self, stream: &mut InStream) -> Result<()> {
        self.value = TermInfo {
            doc_freq: stream.read_c32()?,
            post_offset: self.value.post_offset + stream.read_c64()?,
            skip_offset: self.value.skip_offset + stream.read_c64()?,
        };
        Ok(())
    }
}
