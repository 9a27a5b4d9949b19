use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::core::error::{Error, Result};
use crate::index::segment::Segment;
use crate::index::term_info::TermInfo;
use crate::index::term_stepper::{TermInfoStepper, TermStepper};
use crate::store::folder::Folder;
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;

pub const LEXICON_FORMAT: i64 = 3;

/// Writes the sorted term dictionary for one field at a time: a primary
/// `.dat` stream of prefix-compressed deltas, a sparse `.ix` stream of key
/// frames every `index_interval` terms, and an `.ixix` stream of
/// fixed-width pointers into `.ix` for binary search.
///
/// The writer never retains a term beyond the compression state; callers
/// must supply terms in strictly ascending byte order.
pub struct LexiconWriter {
    folder: Arc<dyn Folder>,
    seg_name: String,
    index_interval: u32,
    dat_out: Option<OutStream>,
    ix_out: Option<OutStream>,
    ixix_out: Option<OutStream>,
    dat_file: String,
    ix_file: String,
    ixix_file: String,
    count: u32,
    ix_count: u32,
    counts: BTreeMap<String, u32>,
    ix_counts: BTreeMap<String, u32>,
    temp_mode: bool,
    term_stepper: TermStepper,
    tinfo_stepper: TermInfoStepper,
}

impl LexiconWriter {
    pub fn new(folder: Arc<dyn Folder>, seg_name: &str, index_interval: u32) -> Self {
        LexiconWriter {
            folder,
            seg_name: seg_name.to_string(),
            index_interval: index_interval.max(1),
            dat_out: None,
            ix_out: None,
            ixix_out: None,
            dat_file: String::new(),
            ix_file: String::new(),
            ixix_file: String::new(),
            count: 0,
            ix_count: 0,
            counts: BTreeMap::new(),
            ix_counts: BTreeMap::new(),
            temp_mode: false,
            term_stepper: TermStepper::new(),
            tinfo_stepper: TermInfoStepper::new(),
        }
    }

    pub fn start_field(&mut self, field_num: u32) -> Result<()> {
        self.dat_file = format!("{}/lexicon-{}.dat", self.seg_name, field_num);
        self.ix_file = format!("{}/lexicon-{}.ix", self.seg_name, field_num);
        self.ixix_file = format!("{}/lexicon-{}.ixix", self.seg_name, field_num);
        self.dat_out = Some(self.folder.open_out(&self.dat_file)?);
        self.ix_out = Some(self.folder.open_out(&self.ix_file)?);
        self.ixix_out = Some(self.folder.open_out(&self.ixix_file)?);
        self.count = 0;
        self.ix_count = 0;
        self.term_stepper.reset();
        self.tinfo_stepper.reset();
        Ok(())
    }

    /// Key-frame the stepper state (the previous term) into `.ix` and
    /// record where the next delta begins in `.dat`.
    fn add_last_term_to_ix(&mut self) -> Result<()> {
        let (Some(dat_out), Some(ix_out), Some(ixix_out)) = (
            self.dat_out.as_mut(),
            self.ix_out.as_mut(),
            self.ixix_out.as_mut(),
        ) else {
            return Err(Error::internal("add_term before start_field"));
        };

        ixix_out.write_i64(ix_out.tell() as i64)?;
        let term = self.term_stepper.value().to_string();
        self.term_stepper.write_key_frame(ix_out, &term)?;
        let tinfo = self.tinfo_stepper.value();
        self.tinfo_stepper.write_key_frame(ix_out, tinfo)?;
        ix_out.write_c64(dat_out.tell())?;
        self.ix_count += 1;
        Ok(())
    }

    pub fn add_term(&mut self, term: &str, tinfo: TermInfo) -> Result<()> {
        debug_assert!(
            self.count == 0 || term.as_bytes() > self.term_stepper.value().as_bytes(),
            "terms must arrive in ascending byte order"
        );
        if self.count % self.index_interval == 0 && !self.temp_mode {
            self.add_last_term_to_ix()?;
        }
        let dat_out = self
            .dat_out
            .as_mut()
            .ok_or_else(|| Error::internal("add_term before start_field"))?;
        self.term_stepper.write_delta(dat_out, term)?;
        self.tinfo_stepper.write_delta(dat_out, tinfo)?;
        self.count += 1;
        Ok(())
    }

    pub fn finish_field(&mut self, field_name: &str) -> Result<()> {
        self.counts.insert(field_name.to_string(), self.count);
        self.ix_counts.insert(field_name.to_string(), self.ix_count);
        for stream in [
            self.dat_out.take(),
            self.ix_out.take(),
            self.ixix_out.take(),
        ] {
            if let Some(mut stream) = stream {
                stream.close()?;
            }
        }
        Ok(())
    }

    /// Redirect `.dat` output to a caller-provided stream, suppressing key
    /// frames; used while sorting runs during merges.
    pub fn enter_temp_mode(&mut self, temp_out: OutStream) -> Result<()> {
        if self.dat_out.is_some() {
            return Err(Error::internal(format!(
                "Can't enter temp mode (filename: {})",
                self.dat_file
            )));
        }
        self.dat_out = Some(temp_out);
        self.count = 0;
        self.ix_count = 0;
        self.term_stepper.reset();
        self.tinfo_stepper.reset();
        self.temp_mode = true;
        Ok(())
    }

    /// Hand the temp stream back to the caller.
    pub fn leave_temp_mode(&mut self) -> Result<OutStream> {
        if !self.temp_mode {
            return Err(Error::internal("Not in temp mode"));
        }
        self.temp_mode = false;
        self.dat_out
            .take()
            .ok_or_else(|| Error::internal("Temp stream missing"))
    }

    /// Verify all three streams were closed and attach the lexicon's
    /// metadata to the segment.
    pub fn finish(&mut self, segment: &mut Segment) -> Result<()> {
        if self.dat_out.is_some() {
            return Err(Error::internal(format!(
                "File '{}' never closed",
                self.dat_file
            )));
        }
        if self.ix_out.is_some() {
            return Err(Error::internal(format!(
                "File '{}' never closed",
                self.ix_file
            )));
        }
        if self.ixix_out.is_some() {
            return Err(Error::internal(format!(
                "File '{}' never closed",
                self.ixix_file
            )));
        }
        segment.store_metadata("lexicon", self.metadata())
    }

    pub fn metadata(&self) -> Value {
        let mut counts = Map::new();
        let mut ix_counts = Map::new();
        for (field, count) in &self.counts {
            counts.insert(field.clone(), json!(count));
        }
        for (field, count) in &self.ix_counts {
            ix_counts.insert(field.clone(), json!(count));
        }
        if counts.is_empty() {
            counts.insert("none".to_string(), json!(0));
            ix_counts.insert("none".to_string(), json!(0));
        }
        json!({
            "format": LEXICON_FORMAT,
            "index_interval": self.index_interval,
            "counts": counts,
            "index_counts": ix_counts,
        })
    }
}

/// Reader over one field's lexicon. `seek` binary-searches the `.ixix`
/// pointers, loads the nearest key frame from `.ix`, then scans `.dat`
/// deltas to the first term at or past the target.
pub struct SegLexicon {
    dat: InStream,
    ix: InStream,
    ixix: InStream,
    index_interval: u32,
    term_count: u64,
    seen: u64,
    current: bool,
    term_stepper: TermStepper,
    tinfo_stepper: TermInfoStepper,
}

impl SegLexicon {
    pub fn open(
        folder: &dyn Folder,
        field_num: u32,
        term_count: u64,
        index_interval: u32,
    ) -> Result<Self> {
        let dat = folder.open_in(&format!("lexicon-{}.dat", field_num))?;
        let ix = folder.open_in(&format!("lexicon-{}.ix", field_num))?;
        let ixix = folder.open_in(&format!("lexicon-{}.ixix", field_num))?;
        Ok(SegLexicon {
            dat,
            ix,
            ixix,
            index_interval: index_interval.max(1),
            term_count,
            seen: 0,
            current: false,
            term_stepper: TermStepper::new(),
            tinfo_stepper: TermInfoStepper::new(),
        })
    }

    fn num_frames(&self) -> u64 {
        self.ixix.length() / 8
    }

    fn read_frame(&mut self, tick: u64) -> Result<(String, TermInfo, u64)> {
        self.ixix.seek(tick * 8)?;
        let ix_offset = self.ixix.read_i64()? as u64;
        self.ix.seek(ix_offset)?;
        let mut term_stepper = TermStepper::new();
        let mut tinfo_stepper = TermInfoStepper::new();
        term_stepper.read_key_frame(&mut self.ix)?;
        tinfo_stepper.read_key_frame(&mut self.ix)?;
        let dat_offset = self.ix.read_c64()?;
        Ok((
            term_stepper.value().to_string(),
            tinfo_stepper.value(),
            dat_offset,
        ))
    }

    /// Position at the first term `>=` target. On equal prefixes the
    /// shorter term sorts first, which plain byte comparison provides.
    pub fn seek(&mut self, target: &str) -> Result<()> {
        let num_frames = self.num_frames();
        if num_frames == 0 {
            self.current = false;
            return Ok(());
        }

        // Greatest key frame whose term <= target. Frame zero holds the
        // empty pre-first-term state, so the search never underflows.
        let mut lo = 0u64;
        let mut hi = num_frames - 1;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let (frame_term, _, _) = self.read_frame(mid)?;
            if frame_term.as_bytes() <= target.as_bytes() {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let (frame_term, frame_tinfo, dat_offset) = self.read_frame(lo)?;
        self.term_stepper.set_value(&frame_term);
        self.tinfo_stepper.set_value(frame_tinfo);
        self.dat.seek(dat_offset)?;
        self.seen = lo * self.index_interval as u64;

        // The zeroth frame's empty value is not a real term.
        if self.seen > 0 && frame_term.as_bytes() >= target.as_bytes() {
            self.current = true;
            return Ok(());
        }

        loop {
            if !self.step()? {
                return Ok(());
            }
            if self.term_stepper.value().as_bytes() >= target.as_bytes() {
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<bool> {
        if self.seen >= self.term_count {
            self.current = false;
            return Ok(false);
        }
        self.term_stepper.read_delta(&mut self.dat)?;
        self.tinfo_stepper.read_delta(&mut self.dat)?;
        self.seen += 1;
        self.current = true;
        Ok(true)
    }

    /// Advance to the next term in order; `seek` must have been called.
    pub fn next(&mut self) -> Result<bool> {
        self.step()
    }

    pub fn current(&self) -> bool {
        self.current
    }

    pub fn term(&self) -> &str {
        self.term_stepper.value()
    }

    pub fn term_info(&self) -> TermInfo {
        self.tinfo_stepper.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ram_folder::RamFolder;

    fn terms_fixture() -> Vec<String> {
        // Enough terms to force several key frames at a small interval.
        let mut terms: Vec<String> = (0..300).map(|i| format!("term{:04}", i)).collect();
        terms.sort();
        terms
    }

    fn build_lexicon(folder: &Arc<RamFolder>, terms: &[String], interval: u32) {
        folder.mkdir("seg_1").unwrap();
        let shared: Arc<dyn Folder> = Arc::clone(folder) as Arc<dyn Folder>;
        let mut writer = LexiconWriter::new(shared, "seg_1", interval);
        writer.start_field(1).unwrap();
        for (i, term) in terms.iter().enumerate() {
            writer
                .add_term(term, TermInfo::new(1, i as u64 * 10, i as u64))
                .unwrap();
        }
        writer.finish_field("content").unwrap();
        let mut segment = Segment::new(1);
        writer.finish(&mut segment).unwrap();
    }

    fn open_lexicon(folder: &Arc<RamFolder>, term_count: u64, interval: u32) -> SegLexicon {
        let seg = folder.find_folder("seg_1").unwrap();
        SegLexicon::open(&*seg, 1, term_count, interval).unwrap()
    }

    #[test]
    fn seek_finds_exact_terms() {
        let folder = Arc::new(RamFolder::new("index"));
        let terms = terms_fixture();
        build_lexicon(&folder, &terms, 16);
        let mut lexicon = open_lexicon(&folder, terms.len() as u64, 16);

        for probe in [0usize, 1, 15, 16, 17, 150, 298, 299] {
            lexicon.seek(&terms[probe]).unwrap();
            assert!(lexicon.current());
            assert_eq!(lexicon.term(), terms[probe]);
            assert_eq!(lexicon.term_info().post_offset, probe as u64 * 10);
        }
    }

    #[test]
    fn seek_lands_on_next_term_for_misses() {
        let folder = Arc::new(RamFolder::new("index"));
        let terms = terms_fixture();
        build_lexicon(&folder, &terms, 16);
        let mut lexicon = open_lexicon(&folder, terms.len() as u64, 16);

        lexicon.seek("term0150a").unwrap();
        assert!(lexicon.current());
        assert_eq!(lexicon.term(), "term0151");

        lexicon.seek("zzzz").unwrap();
        assert!(!lexicon.current());

        lexicon.seek("aaaa").unwrap();
        assert!(lexicon.current());
        assert_eq!(lexicon.term(), "term0000");
    }

    #[test]
    fn sequential_scan_yields_every_term() {
        let folder = Arc::new(RamFolder::new("index"));
        let terms = terms_fixture();
        build_lexicon(&folder, &terms, 16);
        let mut lexicon = open_lexicon(&folder, terms.len() as u64, 16);

        lexicon.seek("").unwrap();
        let mut walked = Vec::new();
        while lexicon.current() {
            walked.push(lexicon.term().to_string());
            lexicon.next().unwrap();
        }
        assert_eq!(walked, terms);
    }

    #[test]
    fn temp_mode_writes_no_key_frames() {
        let folder = Arc::new(RamFolder::new("index"));
        let shared: Arc<dyn Folder> = Arc::clone(&folder) as Arc<dyn Folder>;
        let mut writer = LexiconWriter::new(shared, "seg_1", 2);

        let temp_out = folder.open_out("temp_run").unwrap();
        writer.enter_temp_mode(temp_out).unwrap();
        writer.add_term("alpha", TermInfo::new(1, 0, 0)).unwrap();
        writer.add_term("beta", TermInfo::new(1, 5, 0)).unwrap();
        let mut temp_out = writer.leave_temp_mode().unwrap();
        temp_out.close().unwrap();

        // Only the caller's stream was written; no .ix/.ixix appeared.
        assert!(folder.exists("temp_run"));
        assert!(!folder.exists("seg_1/lexicon-1.ix"));
    }

    #[test]
    fn finish_flags_unclosed_streams() {
        let folder = Arc::new(RamFolder::new("index"));
        folder.mkdir("seg_1").unwrap();
        let shared: Arc<dyn Folder> = Arc::clone(&folder) as Arc<dyn Folder>;
        let mut writer = LexiconWriter::new(shared, "seg_1", 16);
        writer.start_field(1).unwrap();

        let mut segment = Segment::new(1);
        assert!(writer.finish(&mut segment).is_err());
        writer.finish_field("content").unwrap();
        writer.finish(&mut segment).unwrap();
    }

    #[test]
    fn empty_lexicon_metadata_carries_placeholder() {
        let folder = Arc::new(RamFolder::new("index"));
        let shared: Arc<dyn Folder> = Arc::clone(&folder) as Arc<dyn Folder>;
        let writer = LexiconWriter::new(shared, "seg_1", 16);
        let metadata = writer.metadata();
        assert_eq!(metadata["counts"]["none"], json!(0));
        assert_eq!(metadata["format"], json!(LEXICON_FORMAT));
    }
}
