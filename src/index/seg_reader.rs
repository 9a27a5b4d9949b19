use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document};
use crate::index::deletions::{BitVector, DeletionsReader};
use crate::index::doc_reader::DocReader;
use crate::index::highlight::{DocVector, HighlightReader};
use crate::index::lexicon::SegLexicon;
use crate::index::posting_reader::SegPostingList;
use crate::index::segment::Segment;
use crate::index::term_info::TermInfo;
use crate::plan::{Architecture, Schema};
use crate::store::compound::CompoundFileReader;
use crate::store::folder::Folder;

/// Read-side view of one committed segment: metadata, lexicons, posting
/// lists, stored fields, term vectors and tombstones. Bound to the
/// snapshot whose entries located it.
pub struct SegReader {
    schema: Arc<Schema>,
    segment: Segment,
    folder: Arc<dyn Folder>,
    doc_max: DocId,
    deletions: Option<BitVector>,
    del_count: u32,
    lex_counts: HashMap<String, u64>,
    index_interval: u32,
    skip_interval: u32,
    doc_reader: RefCell<Option<DocReader>>,
    hl_reader: RefCell<Option<HighlightReader>>,
}

impl SegReader {
    pub fn open(
        schema: Arc<Schema>,
        index_folder: &dyn Folder,
        entries: &[String],
        seg_name: &str,
    ) -> Result<Self> {
        let mut segment = Segment::new(Segment::name_to_num(seg_name)?);
        segment
            .read_file(index_folder)
            .map_err(|e| e.add_frame(format!("open segment '{}'", seg_name)))?;

        // Packed segments route reads through the compound file.
        let seg_folder = index_folder.find_folder(seg_name)?;
        let seg_folder: Arc<dyn Folder> = if seg_folder.exists("cfmeta.json") {
            Arc::new(CompoundFileReader::open(seg_folder)?)
        } else {
            Arc::from(seg_folder)
        };

        let defaults = Architecture::default();
        let mut lex_counts = HashMap::new();
        let mut index_interval = defaults.index_interval;
        if let Some(lex_meta) = segment.fetch_metadata("lexicon") {
            if let Some(counts) = lex_meta.get("counts").and_then(Value::as_object) {
                for (field, count) in counts {
                    if let Some(count) = count.as_u64() {
                        lex_counts.insert(field.clone(), count);
                    }
                }
            }
            if let Some(interval) = lex_meta.get("index_interval").and_then(Value::as_u64) {
                index_interval = interval as u32;
            }
        }
        let skip_interval = segment
            .fetch_metadata("postings")
            .and_then(|meta| meta.get("skip_interval"))
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(defaults.skip_interval);

        let doc_max = segment.count() as DocId;
        let deletions = DeletionsReader::load(index_folder, seg_name, entries)?;
        let del_count = deletions.as_ref().map(BitVector::count).unwrap_or(0);

        Ok(SegReader {
            schema,
            segment,
            folder: seg_folder,
            doc_max,
            deletions,
            del_count,
            lex_counts,
            index_interval,
            skip_interval,
            doc_reader: RefCell::new(None),
            hl_reader: RefCell::new(None),
        })
    }

    pub fn seg_name(&self) -> &str {
        self.segment.name()
    }

    pub fn seg_num(&self) -> u64 {
        self.segment.number()
    }

    pub fn doc_max(&self) -> DocId {
        self.doc_max
    }

    pub fn del_count(&self) -> u32 {
        self.del_count
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_max as u64 - self.del_count as u64
    }

    pub fn is_deleted(&self, doc_id: DocId) -> bool {
        self.deletions
            .as_ref()
            .map(|bits| bits.get(doc_id))
            .unwrap_or(false)
    }

    pub fn deletions(&self) -> Option<&BitVector> {
        self.deletions.as_ref()
    }

    /// Fields present in this segment, in field-number order.
    pub fn field_names(&self) -> Vec<String> {
        (1..=self.segment.num_fields())
            .filter_map(|num| self.segment.field_name(num).map(str::to_string))
            .collect()
    }

    pub fn term_count(&self, field: &str) -> u64 {
        self.lex_counts.get(field).copied().unwrap_or(0)
    }

    pub fn lexicon(&self, field: &str) -> Result<Option<SegLexicon>> {
        let field_num = self.segment.field_num(field);
        if field_num == 0 {
            return Ok(None);
        }
        let term_count = self.term_count(field);
        if term_count == 0 {
            return Ok(None);
        }
        SegLexicon::open(&*self.folder, field_num, term_count, self.index_interval).map(Some)
    }

    /// Posting list for an exact term, or None when the term (or field)
    /// is absent from this segment.
    pub fn postings(&self, field: &str, term: &str) -> Result<Option<SegPostingList>> {
        let Some(mut lexicon) = self.lexicon(field)? else {
            return Ok(None);
        };
        lexicon.seek(term)?;
        if !lexicon.current() || lexicon.term() != term {
            return Ok(None);
        }
        self.postings_for_info(field, lexicon.term_info()).map(Some)
    }

    /// Posting list from a term info already located via a lexicon.
    pub fn postings_for_info(&self, field: &str, tinfo: TermInfo) -> Result<SegPostingList> {
        let field_num = self.segment.field_num(field);
        let variant = self
            .schema
            .fetch_type(field)
            .map(|ftype| ftype.posting_variant())
            .ok_or_else(|| Error::internal(format!("No schema entry for field '{}'", field)))?;
        SegPostingList::open(&*self.folder, field_num, variant, tinfo, self.skip_interval)
    }

    pub fn doc_freq(&self, field: &str, term: &str) -> Result<u64> {
        let Some(mut lexicon) = self.lexicon(field)? else {
            return Ok(0);
        };
        lexicon.seek(term)?;
        if lexicon.current() && lexicon.term() == term {
            Ok(lexicon.term_info().doc_freq as u64)
        } else {
            Ok(0)
        }
    }

    pub fn fetch_doc(&self, doc_id: DocId) -> Result<Document> {
        let mut slot = self.doc_reader.borrow_mut();
        if slot.is_none() {
            *slot = Some(DocReader::open(&*self.folder, self.doc_max)?);
        }
        slot.as_mut().expect("doc reader present").fetch(doc_id)
    }

    pub fn doc_vector(&self, doc_id: DocId) -> Result<DocVector> {
        let mut slot = self.hl_reader.borrow_mut();
        if slot.is_none() {
            *slot = Some(HighlightReader::open(&*self.folder)?);
        }
        slot.as_mut()
            .expect("highlight reader present")
            .doc_vector(doc_id)
    }
}
