use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document};
use crate::index::index_manager::IndexManager;
use crate::index::seg_reader::SegReader;
use crate::index::snapshot::Snapshot;
use crate::plan::Schema;
use crate::store::folder::Folder;
use crate::store::lock::Lock;
use crate::util::base36::from_base36;
use crate::util::json::{slurp_json, JsonOptions};

/// Multi-segment reader bound to exactly one snapshot. Holds a shared
/// read lock on that snapshot so the purger leaves its files alone, and
/// stacks segment doc-id ranges into one index-wide space.
pub struct IndexReader {
    schema: Arc<Schema>,
    snapshot: Snapshot,
    seg_readers: Vec<SegReader>,
    /// Per segment: index-wide doc id = offset + local doc id.
    offsets: Vec<DocId>,
    doc_max: u64,
    read_lock: Option<Lock>,
}

impl IndexReader {
    /// Bind to the latest snapshot. An index directory with no snapshot
    /// opens as an empty reader.
    pub fn open(folder: Arc<dyn Folder>, manager: &IndexManager) -> Result<IndexReader> {
        let mut snapshot = Snapshot::new();
        snapshot
            .read_file(&*folder, None)
            .map_err(|e| e.add_frame("IndexReader::open"))?;

        let mut read_lock = None;
        if let Some(path) = snapshot.path() {
            let mut lock = manager.make_snapshot_read_lock(Arc::clone(&folder), path);
            lock.obtain()?;
            read_lock = Some(lock);
        }

        let schema = Arc::new(match stored_schema_path(&snapshot) {
            Some(path) => Schema::load(&slurp_json(&*folder, &path, JsonOptions::default())?)?,
            None => Schema::new(),
        });

        let mut seg_readers = Vec::new();
        let mut offsets = Vec::new();
        let mut doc_max = 0u64;
        let entries = snapshot.entry_list();
        for seg_name in snapshot.segment_names() {
            let reader = SegReader::open(Arc::clone(&schema), &*folder, &entries, &seg_name)?;
            offsets.push(doc_max as DocId);
            doc_max += reader.doc_max() as u64;
            seg_readers.push(reader);
        }

        Ok(IndexReader {
            schema,
            snapshot,
            seg_readers,
            offsets,
            doc_max,
            read_lock,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn seg_readers(&self) -> &[SegReader] {
        &self.seg_readers
    }

    pub fn offsets(&self) -> &[DocId] {
        &self.offsets
    }

    /// Total doc slots across segments, deletions included.
    pub fn doc_max(&self) -> u64 {
        self.doc_max
    }

    /// Live docs only.
    pub fn doc_count(&self) -> u64 {
        self.seg_readers.iter().map(SegReader::doc_count).sum()
    }

    pub fn del_count(&self) -> u64 {
        self.seg_readers
            .iter()
            .map(|reader| reader.del_count() as u64)
            .sum()
    }

    pub fn doc_freq(&self, field: &str, term: &str) -> Result<u64> {
        let mut total = 0u64;
        for reader in &self.seg_readers {
            total += reader.doc_freq(field, term)?;
        }
        Ok(total)
    }

    /// Fetch by index-wide doc id.
    pub fn fetch_doc(&self, doc_id: DocId) -> Result<Document> {
        if doc_id == 0 || doc_id as u64 > self.doc_max {
            return Err(Error::bad_argument(format!(
                "Doc id {} out of range [1, {}]",
                doc_id, self.doc_max
            )));
        }
        let tick = match self.offsets.binary_search(&doc_id) {
            // A hit on an offset boundary belongs to the previous segment.
            Ok(tick) => tick.saturating_sub(1),
            Err(tick) => tick - 1,
        };
        self.seg_readers[tick].fetch_doc(doc_id - self.offsets[tick])
    }

    /// Release the snapshot pin. Dropping the reader does the same.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut lock) = self.read_lock.take() {
            lock.release()?;
        }
        Ok(())
    }
}

fn stored_schema_path(snapshot: &Snapshot) -> Option<String> {
    let mut best: Option<(u64, &str)> = None;
    for entry in snapshot.entries() {
        let Some(stem) = entry
            .strip_prefix("schema_")
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            continue;
        };
        if let Ok(number) = from_base36(stem) {
            if best.map(|(n, _)| number > n).unwrap_or(true) {
                best = Some((number, entry));
            }
        }
    }
    best.map(|(_, path)| path.to_string())
}
