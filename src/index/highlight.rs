use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::index::posting::PostingPosition;
use crate::index::segment::Segment;
use crate::store::folder::Folder;
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;

pub const HIGHLIGHT_FORMAT: i64 = 1;

/// Term vectors for one document: per highlightable field, each term with
/// its positions and offsets.
#[derive(Debug, Default, PartialEq)]
pub struct DocVector {
    pub fields: BTreeMap<String, BTreeMap<String, Vec<PostingPosition>>>,
}

impl DocVector {
    pub fn term_vector(&self, field: &str, term: &str) -> Option<&[PostingPosition]> {
        self.fields
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
    }
}

/// Writes `highlight.dat` / `.ix`: the per-doc term vectors backing
/// highlighting. Every doc gets a record so the offset index stays dense;
/// docs without highlightable fields write an empty one.
pub struct HighlightWriter {
    dat_out: Option<OutStream>,
    ix_out: Option<OutStream>,
}

impl HighlightWriter {
    pub fn new(folder: &Arc<dyn Folder>, seg_name: &str) -> Result<Self> {
        Ok(HighlightWriter {
            dat_out: Some(folder.open_out(&format!("{}/highlight.dat", seg_name))?),
            ix_out: Some(folder.open_out(&format!("{}/highlight.ix", seg_name))?),
        })
    }

    pub fn add_doc(&mut self, doc_vec: &DocVector) -> Result<()> {
        let (Some(dat_out), Some(ix_out)) = (self.dat_out.as_mut(), self.ix_out.as_mut()) else {
            return Err(Error::internal("add_doc after finish"));
        };

        ix_out.write_i64(dat_out.tell() as i64)?;
        dat_out.write_c32(doc_vec.fields.len() as u32)?;
        for (field, terms) in &doc_vec.fields {
            dat_out.write_string(field)?;
            dat_out.write_c32(terms.len() as u32)?;
            for (term, positions) in terms {
                dat_out.write_string(term)?;
                dat_out.write_c32(positions.len() as u32)?;
                for position in positions {
                    dat_out.write_c32(position.pos)?;
                    dat_out.write_c32(position.start_offset)?;
                    dat_out.write_c32(position.end_offset)?;
                }
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, segment: &mut Segment) -> Result<()> {
        if let Some(mut dat_out) = self.dat_out.take() {
            dat_out.close()?;
        }
        if let Some(mut ix_out) = self.ix_out.take() {
            ix_out.close()?;
        }
        segment.store_metadata("highlight", json!({"format": HIGHLIGHT_FORMAT}))
    }
}

pub struct HighlightReader {
    dat: InStream,
    ix: InStream,
}

impl HighlightReader {
    pub fn open(folder: &dyn Folder) -> Result<Self> {
        Ok(HighlightReader {
            dat: folder.open_in("highlight.dat")?,
            ix: folder.open_in("highlight.ix")?,
        })
    }

    pub fn doc_vector(&mut self, doc_id: DocId) -> Result<DocVector> {
        self.ix.seek((doc_id as u64 - 1) * 8)?;
        let offset = self.ix.read_i64()? as u64;
        self.dat.seek(offset)?;

        let mut doc_vec = DocVector::default();
        let num_fields = self.dat.read_c32()?;
        for _ in 0..num_fields {
            let field = self.dat.read_string()?;
            let num_terms = self.dat.read_c32()?;
            let mut terms = BTreeMap::new();
            for _ in 0..num_terms {
                let term = self.dat.read_string()?;
                let freq = self.dat.read_c32()?;
                let mut positions = Vec::with_capacity(freq as usize);
                for _ in 0..freq {
                    positions.push(PostingPosition {
                        pos: self.dat.read_c32()?,
                        start_offset: self.dat.read_c32()?,
                        end_offset: self.dat.read_c32()?,
                    });
                }
                terms.insert(term, positions);
            }
            doc_vec.fields.insert(field, terms);
        }
        Ok(doc_vec)
    }
}
