use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::posting::PostingPosition;
use crate::index::term_info::TermInfo;
use crate::plan::PostingVariant;
use crate::store::folder::Folder;
use crate::store::instream::InStream;

#[derive(Debug, Clone, Copy)]
struct SkipEntry {
    doc_id: DocId,
    dat_offset: u64,
    docs_read: u32,
}

/// Stream of one term's postings within a segment: doc ids ascending, with
/// skip-entry-assisted `advance`. The leaf the matcher tree stands on.
pub struct SegPostingList {
    dat: InStream,
    variant: PostingVariant,
    doc_freq: u32,
    docs_read: u32,
    doc_id: DocId,
    freq: u32,
    norm_byte: u8,
    positions: Vec<PostingPosition>,
    skip_entries: Vec<SkipEntry>,
    next_skip: usize,
}

impl SegPostingList {
    /// `folder` is the segment directory; streams are positioned from the
    /// term info's offsets.
    pub fn open(
        folder: &dyn Folder,
        field_num: u32,
        variant: PostingVariant,
        tinfo: TermInfo,
        skip_interval: u32,
    ) -> Result<Self> {
        let mut dat = folder.open_in(&format!("postings-{}.dat", field_num))?;
        dat.seek(tinfo.post_offset)?;

        // The skip stream is sparse; all of this term's entries load up
        // front.
        let skip_interval = skip_interval.max(2);
        let num_entries = if tinfo.doc_freq == 0 {
            0
        } else {
            (tinfo.doc_freq - 1) / skip_interval
        };
        let mut skip_entries = Vec::with_capacity(num_entries as usize);
        if num_entries > 0 {
            let mut skip = folder.open_in(&format!("postings-{}.skip", field_num))?;
            skip.seek(tinfo.skip_offset)?;
            for _ in 0..num_entries {
                skip_entries.push(SkipEntry {
                    doc_id: skip.read_c32()?,
                    dat_offset: skip.read_c64()?,
                    docs_read: skip.read_c32()?,
                });
            }
        }

        Ok(SegPostingList {
            dat,
            variant,
            doc_freq: tinfo.doc_freq,
            docs_read: 0,
            doc_id: 0,
            freq: 0,
            norm_byte: 0,
            positions: Vec::new(),
            skip_entries,
            next_skip: 0,
        })
    }

    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn norm_byte(&self) -> u8 {
        self.norm_byte
    }

    pub fn positions(&self) -> &[PostingPosition] {
        &self.positions
    }

    fn read_record(&mut self) -> Result<()> {
        self.doc_id += self.dat.read_c32()?;
        if self.variant.has_freq() {
            self.freq = self.dat.read_c32()?;
            self.norm_byte = self.dat.read_u8()?;
        } else {
            self.freq = 1;
            self.norm_byte = 0;
        }
        self.positions.clear();
        if self.variant.has_positions() {
            let mut pos = 0u32;
            let mut start = 0u32;
            for _ in 0..self.freq {
                pos += self.dat.read_c32()?;
                start += self.dat.read_c32()?;
                let len = self.dat.read_c32()?;
                self.positions.push(PostingPosition {
                    pos,
                    start_offset: start,
                    end_offset: start + len,
                });
            }
        }
        self.docs_read += 1;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<DocId>> {
        if self.docs_read >= self.doc_freq {
            return Ok(None);
        }
        self.read_record()?;
        Ok(Some(self.doc_id))
    }

    /// First doc id `>=` target, skipping through the skip list where it
    /// helps.
    pub fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        // Jump over whole skip blocks that end before the target.
        while self.next_skip < self.skip_entries.len() {
            let entry = self.skip_entries[self.next_skip];
            if entry.doc_id >= target || entry.docs_read <= self.docs_read {
                if entry.doc_id >= target {
                    break;
                }
                self.next_skip += 1;
                continue;
            }
            self.dat.seek(entry.dat_offset)?;
            self.doc_id = entry.doc_id;
            self.docs_read = entry.docs_read;
            self.next_skip += 1;
        }

        if self.docs_read > 0 && self.doc_id >= target {
            return Ok(Some(self.doc_id));
        }
        while let Some(doc_id) = self.next()? {
            if doc_id >= target {
                return Ok(Some(doc_id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Inversion, Token};
    use crate::index::lexicon::LexiconWriter;
    use crate::index::posting_writer::PostingListWriter;
    use crate::index::segment::Segment;
    use crate::index::similarity::Similarity;
    use crate::store::ram_folder::RamFolder;
    use std::sync::Arc;

    fn single_word_inversion(word: &str) -> Inversion {
        let mut inv = Inversion::new();
        inv.append(Token::new(word, 0, word.len() as u32));
        inv
    }

    /// Write one field with the word "drum" in the given docs, then open
    /// a posting list over it.
    fn build(doc_ids: &[DocId], skip_interval: u32) -> SegPostingList {
        let folder = Arc::new(RamFolder::new("index"));
        folder.mkdir("seg_1").unwrap();
        let shared: Arc<dyn Folder> = Arc::clone(&folder) as Arc<dyn Folder>;
        let sim = Arc::new(Similarity::new());

        let mut plist_writer =
            PostingListWriter::new(Arc::clone(&shared), "seg_1", skip_interval, sim);
        for &doc_id in doc_ids {
            let mut inv = single_word_inversion("drum");
            plist_writer.add_inversion(1, "content", PostingVariant::Rich, doc_id, &mut inv, 1.0);
        }

        let mut lex_writer = LexiconWriter::new(Arc::clone(&shared), "seg_1", 128);
        let mut segment = Segment::new(1);
        segment.add_field("content");
        plist_writer.finish(&mut segment, &mut lex_writer).unwrap();

        let seg_folder = folder.find_folder("seg_1").unwrap();
        let mut lexicon =
            crate::index::lexicon::SegLexicon::open(&*seg_folder, 1, 1, 128).unwrap();
        lexicon.seek("drum").unwrap();
        assert_eq!(lexicon.term(), "drum");

        SegPostingList::open(
            &*seg_folder,
            1,
            PostingVariant::Rich,
            lexicon.term_info(),
            skip_interval,
        )
        .unwrap()
    }

    #[test]
    fn next_walks_ascending_doc_ids() {
        let mut plist = build(&[1, 3, 7, 20], 4);
        let mut walked = Vec::new();
        while let Some(doc_id) = plist.next().unwrap() {
            walked.push(doc_id);
            assert_eq!(plist.freq(), 1);
            assert_eq!(plist.positions().len(), 1);
        }
        assert_eq!(walked, vec![1, 3, 7, 20]);
    }

    #[test]
    fn advance_skips_through_long_lists() {
        let doc_ids: Vec<DocId> = (1..=500).map(|i| i * 2).collect();
        let mut plist = build(&doc_ids, 8);

        assert_eq!(plist.advance(2).unwrap(), Some(2));
        assert_eq!(plist.advance(499).unwrap(), Some(500));
        assert_eq!(plist.advance(501).unwrap(), Some(502));
        // Already positioned at or past the target.
        assert_eq!(plist.advance(100).unwrap(), Some(502));
        assert_eq!(plist.advance(1001).unwrap(), None);
        assert_eq!(plist.next().unwrap(), None);
    }

    #[test]
    fn advance_to_every_doc_matches_linear_scan() {
        let doc_ids: Vec<DocId> = (1..=200).map(|i| i * 3).collect();
        for target in [3u32, 4, 299, 300, 600] {
            let mut plist = build(&doc_ids, 8);
            let expected = doc_ids.iter().copied().find(|&d| d >= target);
            assert_eq!(plist.advance(target).unwrap(), expected, "target {}", target);
        }
    }
}
