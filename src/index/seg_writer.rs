use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::error::Result;
use crate::core::types::{DocId, Document};
use crate::index::doc_writer::DocWriter;
use crate::index::highlight::{DocVector, HighlightWriter};
use crate::index::inverter::Inverter;
use crate::index::lexicon::LexiconWriter;
use crate::index::posting::DocPosting;
use crate::index::posting_writer::PostingListWriter;
use crate::index::seg_reader::SegReader;
use crate::index::segment::Segment;
use crate::plan::{Architecture, Schema};
use crate::store::compound::CompoundFileWriter;
use crate::store::folder::Folder;

/// Builds one new segment: stored fields, posting accumulator, term
/// vectors and the segment metadata, finally packed into a compound file
/// when the architecture says so.
pub struct SegWriter {
    folder: Arc<dyn Folder>,
    schema: Arc<Schema>,
    arch: Architecture,
    segment: Segment,
    plist_writer: PostingListWriter,
    lex_writer: LexiconWriter,
    doc_writer: DocWriter,
    hl_writer: HighlightWriter,
}

impl SegWriter {
    pub fn new(
        folder: Arc<dyn Folder>,
        schema: Arc<Schema>,
        arch: Architecture,
        segment: Segment,
    ) -> Result<Self> {
        folder.mkdir(segment.name())?;
        let seg_name = segment.name().to_string();
        let plist_writer = PostingListWriter::new(
            Arc::clone(&folder),
            &seg_name,
            arch.skip_interval,
            schema.similarity(),
        );
        let lex_writer = LexiconWriter::new(Arc::clone(&folder), &seg_name, arch.index_interval);
        let doc_writer = DocWriter::new(&folder, &seg_name)?;
        let hl_writer = HighlightWriter::new(&folder, &seg_name)?;
        Ok(SegWriter {
            folder,
            schema,
            arch,
            segment,
            plist_writer,
            lex_writer,
            doc_writer,
            hl_writer,
        })
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn doc_count(&self) -> u64 {
        self.segment.count()
    }

    /// Route one document through inversion and all sub-writers. Returns
    /// the doc id assigned within this segment.
    pub fn add_doc(&mut self, doc: &Document, doc_boost: f32) -> Result<DocId> {
        // The count moves only after inversion succeeds, so a rejected
        // doc burns no id and the stored-field index stays dense.
        let doc_id = self.segment.count() as DocId + 1;
        let entries = Inverter::invert_doc(&self.schema, &mut self.segment, doc)?;
        self.segment.increment_count(1);

        let mut stored: Vec<(&str, &crate::core::types::FieldValue)> = Vec::new();
        let mut doc_vec = DocVector::default();

        for entry in &entries {
            if let Some(value) = &entry.stored {
                stored.push((&entry.name, value));
            }
        }
        self.doc_writer.add_doc(&stored)?;

        for mut entry in entries {
            let Some(mut inversion) = entry.inversion.take() else {
                continue;
            };
            inversion.invert();

            if entry.highlightable {
                let mut terms = BTreeMap::new();
                while let Some(cluster) = inversion.next_cluster() {
                    let positions = cluster
                        .iter()
                        .map(|token| crate::index::posting::PostingPosition {
                            pos: token.pos,
                            start_offset: token.start_offset,
                            end_offset: token.end_offset,
                        })
                        .collect();
                    terms.insert(cluster[0].text.clone(), positions);
                }
                doc_vec.fields.insert(entry.name.clone(), terms);
                // Rewind so the accumulator can take its own pass.
                inversion.invert();
            }

            self.plist_writer.add_inversion(
                entry.field_num,
                &entry.name,
                entry.variant,
                doc_id,
                &mut inversion,
                entry.boost * doc_boost,
            );
        }

        self.hl_writer.add_doc(&doc_vec)?;
        Ok(doc_id)
    }

    /// Feed a whole committed segment through this writer, renumbering doc
    /// ids via `doc_map` (0 = deleted, dropped). Postings are copied at
    /// the posting level, so fields that are indexed but not stored
    /// survive the merge.
    pub fn add_segment(&mut self, reader: &SegReader, doc_map: &[DocId]) -> Result<()> {
        debug!(
            source = reader.seg_name(),
            target = self.segment.name(),
            "absorbing segment"
        );

        // Stored fields and term vectors, in new doc-id order.
        let mut live = 0u64;
        for old_doc in 1..=reader.doc_max() {
            if doc_map[old_doc as usize] == 0 {
                continue;
            }
            live += 1;
            let doc = reader.fetch_doc(old_doc)?;
            let stored: Vec<(&str, &crate::core::types::FieldValue)> = doc
                .fields
                .iter()
                .map(|(name, value)| (name.as_str(), value))
                .collect();
            self.doc_writer.add_doc(&stored)?;
            self.hl_writer.add_doc(&reader.doc_vector(old_doc)?)?;
        }
        self.segment.increment_count(live);

        // Postings, term by term, doc ids remapped.
        for field_name in reader.field_names() {
            let Some(field_type) = self.schema.fetch_type(&field_name) else {
                continue;
            };
            if !field_type.is_indexed() {
                continue;
            }
            let variant = field_type.posting_variant();
            let field_num = self.segment.add_field(&field_name);

            let Some(mut lexicon) = reader.lexicon(&field_name)? else {
                continue;
            };
            lexicon.seek("")?;
            while lexicon.current() {
                let term = lexicon.term().to_string();
                let mut plist = reader.postings_for_info(&field_name, lexicon.term_info())?;
                while let Some(old_doc) = plist.next()? {
                    let new_doc = doc_map[old_doc as usize];
                    if new_doc == 0 {
                        continue;
                    }
                    self.plist_writer.add_raw_posting(
                        field_num,
                        &field_name,
                        variant,
                        &term,
                        DocPosting {
                            doc_id: new_doc,
                            freq: plist.freq(),
                            norm_byte: plist.norm_byte(),
                            positions: plist.positions().to_vec(),
                        },
                    );
                }
                lexicon.next()?;
            }
        }
        Ok(())
    }

    /// Flush everything, write `segmeta.json`, optionally consolidate into
    /// a compound file.
    pub fn finish(mut self) -> Result<Segment> {
        self.plist_writer
            .finish(&mut self.segment, &mut self.lex_writer)?;
        self.lex_writer.finish(&mut self.segment)?;
        self.doc_writer.finish(&mut self.segment)?;
        self.hl_writer.finish(&mut self.segment)?;
        self.segment.write_file(&*self.folder)?;

        if self.arch.use_compound_files {
            let seg_folder = self.folder.find_folder(self.segment.name())?;
            CompoundFileWriter::consolidate(&*seg_folder)?;
        }
        debug!(
            segment = self.segment.name(),
            docs = self.segment.count(),
            "segment finished"
        );
        Ok(self.segment)
    }

    /// Drop all buffered state; on-disk leftovers are reclaimed by the
    /// next purge.
    pub fn abort(self) {}
}
