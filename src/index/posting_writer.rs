use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::analysis::Inversion;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::lexicon::LexiconWriter;
use crate::index::posting::{DocPosting, PostingAccumulator};
use crate::index::segment::Segment;
use crate::index::similarity::Similarity;
use crate::index::term_info::TermInfo;
use crate::plan::PostingVariant;
use crate::store::folder::Folder;

pub const POSTINGS_FORMAT: i64 = 1;

struct FieldPool {
    name: String,
    variant: PostingVariant,
    accumulator: PostingAccumulator,
}

/// Accumulates raw postings per (field, term) and flushes them as the
/// `postings-<field>.dat` / `.skip` stream pair, registering each term
/// with the lexicon writer as it goes.
pub struct PostingListWriter {
    folder: Arc<dyn Folder>,
    seg_name: String,
    skip_interval: u32,
    sim: Arc<Similarity>,
    fields: BTreeMap<u32, FieldPool>,
}

impl PostingListWriter {
    pub fn new(
        folder: Arc<dyn Folder>,
        seg_name: &str,
        skip_interval: u32,
        sim: Arc<Similarity>,
    ) -> Self {
        PostingListWriter {
            folder,
            seg_name: seg_name.to_string(),
            skip_interval: skip_interval.max(2),
            sim,
            fields: BTreeMap::new(),
        }
    }

    fn pool(&mut self, field_num: u32, field_name: &str, variant: PostingVariant) -> &mut FieldPool {
        self.fields.entry(field_num).or_insert_with(|| FieldPool {
            name: field_name.to_string(),
            variant,
            accumulator: PostingAccumulator::new(),
        })
    }

    /// Invert one field of one document into the accumulator. The norm
    /// byte encodes field length scaled by the field and document boosts.
    pub fn add_inversion(
        &mut self,
        field_num: u32,
        field_name: &str,
        variant: PostingVariant,
        doc_id: DocId,
        inversion: &mut Inversion,
        boost: f32,
    ) {
        let norm = self.sim.length_norm(inversion.len() as u32) * boost;
        let norm_byte = self.sim.encode_norm(norm);
        self.pool(field_num, field_name, variant)
            .accumulator
            .add_inversion(doc_id, inversion, norm_byte);
    }

    /// Feed a posting read from another segment, doc id already remapped.
    pub fn add_raw_posting(
        &mut self,
        field_num: u32,
        field_name: &str,
        variant: PostingVariant,
        term: &str,
        posting: DocPosting,
    ) {
        self.pool(field_num, field_name, variant)
            .accumulator
            .add_raw(term, posting);
    }

    /// Write every field's posting and skip streams, handing term infos to
    /// the lexicon writer field by field.
    pub fn finish(&mut self, segment: &mut Segment, lex_writer: &mut LexiconWriter) -> Result<()> {
        for (&field_num, pool) in &self.fields {
            if pool.accumulator.is_empty() {
                continue;
            }
            lex_writer.start_field(field_num)?;

            let mut dat_out = self
                .folder
                .open_out(&format!("{}/postings-{}.dat", self.seg_name, field_num))?;
            let mut skip_out = self
                .folder
                .open_out(&format!("{}/postings-{}.skip", self.seg_name, field_num))?;

            for (term, postings) in pool.accumulator.iter() {
                let tinfo = TermInfo::new(
                    postings.len() as u32,
                    dat_out.tell(),
                    skip_out.tell(),
                );

                let mut last_doc: DocId = 0;
                let mut docs_written = 0u32;
                for posting in postings {
                    dat_out.write_c32(posting.doc_id - last_doc)?;
                    if pool.variant.has_freq() {
                        dat_out.write_c32(posting.freq)?;
                        dat_out.write_u8(posting.norm_byte)?;
                    }
                    if pool.variant.has_positions() {
                        let mut last_pos = 0u32;
                        let mut last_start = 0u32;
                        for position in &posting.positions {
                            dat_out.write_c32(position.pos - last_pos)?;
                            dat_out.write_c32(position.start_offset - last_start)?;
                            dat_out.write_c32(position.end_offset - position.start_offset)?;
                            last_pos = position.pos;
                            last_start = position.start_offset;
                        }
                    }
                    last_doc = posting.doc_id;
                    docs_written += 1;

                    // Skip entries land every skip_interval docs, never
                    // after the final one.
                    if docs_written % self.skip_interval == 0
                        && (docs_written as usize) < postings.len()
                    {
                        skip_out.write_c32(posting.doc_id)?;
                        skip_out.write_c64(dat_out.tell())?;
                        skip_out.write_c32(docs_written)?;
                    }
                }
                lex_writer.add_term(term, tinfo)?;
            }

            dat_out.close()?;
            skip_out.close()?;
            lex_writer.finish_field(&pool.name)?;
        }

        segment.store_metadata(
            "postings",
            json!({"format": POSTINGS_FORMAT, "skip_interval": self.skip_interval}),
        )
    }
}
