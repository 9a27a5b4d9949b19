use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::index::deletions::DeletionsWriter;
use crate::index::file_purger::FilePurger;
use crate::index::index_manager::IndexManager;
use crate::index::merge_policy::SegmentCandidate;
use crate::index::seg_reader::SegReader;
use crate::index::seg_writer::SegWriter;
use crate::index::segment::Segment;
use crate::index::snapshot::Snapshot;
use crate::plan::{Architecture, Schema};
use crate::store::folder::{delete_tree, list_names, Folder};
use crate::store::lock::Lock;
use crate::util::base36::to_base36;
use crate::util::json::{slurp_json, spew_json, JsonOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Bind to the latest snapshot; fail if the index doesn't exist.
    Open,
    /// Like Open, but initialize an empty index when none exists.
    Create,
    /// Discard all existing index state and start from scratch.
    Truncate,
}

/// The single writer for an index directory. Holds the write lock from
/// open to commit (or abort); publishes its work atomically through a new
/// snapshot.
pub struct Indexer {
    folder: Arc<dyn Folder>,
    schema: Arc<Schema>,
    manager: Arc<IndexManager>,
    arch: Architecture,
    write_lock: Lock,
    base_snapshot: Snapshot,
    seg_readers: Vec<SegReader>,
    seg_writer: Option<SegWriter>,
    del_writer: DeletionsWriter,
    new_snapshot_num: u64,
    prepared: Option<PreparedCommit>,
    committed: bool,
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("arch", &self.arch)
            .field("new_snapshot_num", &self.new_snapshot_num)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

/// Everything a commit needs after all segment data is on disk: the
/// manifest still waiting for its atomic rename.
struct PreparedCommit {
    publish: Option<(Snapshot, String)>,
}

impl Indexer {
    pub fn open(
        mut schema: Schema,
        folder: Arc<dyn Folder>,
        manager: Arc<IndexManager>,
        arch: Architecture,
        mode: OpenMode,
    ) -> Result<Indexer> {
        let mut write_lock = manager.make_write_lock(Arc::clone(&folder));
        write_lock.obtain()?;

        let mut base_snapshot = Snapshot::new();
        if mode != OpenMode::Truncate {
            base_snapshot.read_file(&*folder, None)?;
            if base_snapshot.path().is_none() && mode == OpenMode::Open {
                return Err(Error::io(format!(
                    "No snapshot found in '{}'",
                    folder.path()
                )));
            }
        }

        // A schema on disk freezes the fields it names; the supplied
        // schema must carry them unchanged, though it may add new ones.
        if let Some(stored) = read_stored_schema(&*folder, &base_snapshot)? {
            for name in stored.field_names() {
                match schema.fetch_type(name) {
                    Some(ftype) if Some(ftype) == stored.fetch_type(name) => {}
                    _ => {
                        return Err(Error::new(
                            ErrorKind::InvalidSchema,
                            format!("Supplied schema conflicts with stored field '{}'", name),
                        ));
                    }
                }
            }
            schema.freeze();
        }
        let schema = Arc::new(schema);

        let mut seg_readers = Vec::new();
        for seg_name in base_snapshot.segment_names() {
            seg_readers.push(SegReader::open(
                Arc::clone(&schema),
                &*folder,
                &base_snapshot.entry_list(),
                &seg_name,
            )?);
        }

        // New numbers must clear everything on disk, including leftovers
        // from aborted sessions.
        let mut highest_seg = seg_readers.iter().map(SegReader::seg_num).max().unwrap_or(0);
        let mut highest_snap = base_snapshot.number().unwrap_or(0);
        for name in list_names(&*folder, "")? {
            if Segment::valid_seg_name(&name) {
                highest_seg = highest_seg.max(Segment::name_to_num(&name)?);
            } else if let Ok(number) = Snapshot::number_of(&name) {
                highest_snap = highest_snap.max(number);
            }
        }

        let segment = Segment::new(highest_seg + 1);
        let seg_writer = SegWriter::new(
            Arc::clone(&folder),
            Arc::clone(&schema),
            arch,
            segment,
        )?;

        Ok(Indexer {
            folder,
            schema,
            manager,
            arch,
            write_lock,
            base_snapshot,
            seg_readers,
            seg_writer: Some(seg_writer),
            del_writer: DeletionsWriter::new(),
            new_snapshot_num: highest_snap + 1,
            prepared: None,
            committed: false,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn add_doc(&mut self, doc: &Document) -> Result<DocId> {
        self.add_doc_with_boost(doc, 1.0)
    }

    pub fn add_doc_with_boost(&mut self, doc: &Document, boost: f32) -> Result<DocId> {
        self.seg_writer
            .as_mut()
            .ok_or_else(|| Error::internal("Indexer already committed"))?
            .add_doc(doc, boost)
    }

    /// Mark every existing doc whose `field` contains `term` as deleted.
    /// Takes effect at commit; the term is matched verbatim.
    pub fn delete_by_term(&mut self, field: &str, term: &str) -> Result<()> {
        for reader in &self.seg_readers {
            if let Some(mut plist) = reader.postings(field, term)? {
                while let Some(doc_id) = plist.next()? {
                    if !reader.is_deleted(doc_id) {
                        self.del_writer.delete_doc(reader.seg_name(), doc_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush segment data, run the elected merge and write every file the
    /// next snapshot will reference, but stop short of publishing it. A
    /// crash after this point leaves the previous snapshot authoritative.
    pub fn prepare_commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(Error::internal("Commit already completed"));
        }
        if self.prepared.is_some() {
            return Err(Error::internal("Commit already prepared"));
        }
        let seg_writer = self
            .seg_writer
            .take()
            .ok_or_else(|| Error::internal("Indexer already committed"))?;

        if !self.has_changes_with(&seg_writer) && self.base_snapshot.path().is_some() {
            // Nothing to publish; drop the empty segment dir quietly.
            let empty_name = seg_writer.segment().name().to_string();
            seg_writer.abort();
            let _ = delete_tree(&*self.folder, &empty_name);
            self.prepared = Some(PreparedCommit { publish: None });
            return Ok(());
        }

        let snapshot_name = Snapshot::filename_for(self.new_snapshot_num);
        let mut new_snapshot = Snapshot::new();

        // 1. Flush the fresh segment, if it holds anything.
        let mut new_seg_names: Vec<String> = Vec::new();
        let next_seg_num = seg_writer.segment().number() + 1;
        if seg_writer.doc_count() > 0 {
            let segment = seg_writer.finish()?;
            new_seg_names.push(segment.name().to_string());
        } else {
            let empty_name = seg_writer.segment().name().to_string();
            seg_writer.abort();
            let _ = delete_tree(&*self.folder, &empty_name);
        }

        // 2. Consult the merge policy over the committed segments.
        let mut merged_away: BTreeSet<String> = BTreeSet::new();
        let candidates: Vec<SegmentCandidate> = self
            .seg_readers
            .iter()
            .map(|reader| SegmentCandidate {
                name: reader.seg_name().to_string(),
                number: reader.seg_num(),
                doc_count: reader
                    .doc_count()
                    .saturating_sub(self.del_writer.pending_count(reader.seg_name())),
            })
            .collect();
        if self.manager.merge_policy().should_merge(&candidates) {
            let selected = self.manager.merge_policy().select(&candidates);
            if selected.len() >= 2 {
                info!(count = selected.len(), "merging segments");
                let mut merge_writer = SegWriter::new(
                    Arc::clone(&self.folder),
                    Arc::clone(&self.schema),
                    self.arch,
                    Segment::new(next_seg_num),
                )?;
                for candidate in &selected {
                    let reader = self
                        .seg_readers
                        .iter()
                        .find(|r| r.seg_name() == candidate.name)
                        .expect("candidate came from these readers");
                    let base = merge_writer.doc_count() as DocId;
                    let doc_map = self.build_doc_map(reader, base);
                    merge_writer.add_segment(reader, &doc_map)?;
                    merged_away.insert(candidate.name.clone());
                    self.del_writer.forget(&candidate.name);
                }
                let merge_segment = merge_writer.finish()?;
                new_seg_names.push(merge_segment.name().to_string());
            }
        }

        // 3. Tombstones for surviving segments with fresh deletions.
        let snapshot_stem = snapshot_name.trim_end_matches(".json").to_string();
        let mut existing_state = BTreeMap::new();
        for reader in &self.seg_readers {
            if merged_away.contains(reader.seg_name()) {
                continue;
            }
            existing_state.insert(
                reader.seg_name().to_string(),
                (reader.doc_max(), reader.deletions().cloned()),
            );
        }
        let tombstones = self
            .del_writer
            .finish(&*self.folder, &snapshot_stem, &existing_state)?;

        // 4. Gather the manifest: surviving old segments keep their old
        // entries (minus superseded tombstones), new segments list their
        // freshly written files.
        for reader in &self.seg_readers {
            if merged_away.contains(reader.seg_name()) {
                continue;
            }
            let prefix = format!("{}/", reader.seg_name());
            let has_new_tombstone = tombstones.iter().any(|t| t.starts_with(&prefix));
            for entry in self.base_snapshot.entries() {
                if !entry.starts_with(&prefix) {
                    continue;
                }
                if has_new_tombstone && entry.contains("/deletions-") {
                    continue;
                }
                new_snapshot.add_entry(entry);
            }
        }
        for tombstone in &tombstones {
            new_snapshot.add_entry(tombstone);
        }
        for seg_name in &new_seg_names {
            for file in list_names(&*self.folder, seg_name)? {
                new_snapshot.add_entry(format!("{}/{}", seg_name, file));
            }
        }

        let schema_file = format!("schema_{}.json", to_base36(self.new_snapshot_num));
        spew_json(
            &self.schema.dump()?,
            &*self.folder,
            &schema_file,
            JsonOptions::default(),
        )?;
        new_snapshot.add_entry(schema_file);

        self.prepared = Some(PreparedCommit {
            publish: Some((new_snapshot, snapshot_name)),
        });
        Ok(())
    }

    /// Publish and clean up: snapshot rename, purge, write-lock release.
    /// Runs `prepare_commit` first if the caller didn't.
    pub fn commit(mut self) -> Result<()> {
        if self.prepared.is_none() {
            self.prepare_commit()?;
        }
        let prepared = self
            .prepared
            .take()
            .ok_or_else(|| Error::internal("Commit never prepared"))?;

        if let Some((mut new_snapshot, snapshot_name)) = prepared.publish {
            // Atomic publication: before the rename lands, readers still
            // see the previous snapshot.
            new_snapshot.write_file(&*self.folder, &snapshot_name)?;
            debug!(snapshot = %snapshot_name, "snapshot published");

            // The new snapshot is authoritative even if cleanup stumbles.
            if let Err(error) = FilePurger::new(Arc::clone(&self.folder)).purge() {
                warn!(%error, "post-commit purge failed; files remain until next purge");
            }
        }

        self.committed = true;
        self.write_lock.release()
    }

    fn has_changes_with(&self, seg_writer: &SegWriter) -> bool {
        seg_writer.doc_count() > 0 || self.del_writer.has_deletions()
    }

    /// Old-local-id to new-id map for a merge: deleted docs map to 0,
    /// survivors renumber densely starting past the docs the merge
    /// segment already absorbed.
    fn build_doc_map(&self, reader: &SegReader, base: DocId) -> Vec<DocId> {
        let pending = self.del_writer.pending(reader.seg_name());
        let mut doc_map = vec![0u32; reader.doc_max() as usize + 1];
        let mut next = base;
        for old_doc in 1..=reader.doc_max() {
            let deleted = reader.is_deleted(old_doc)
                || pending.map(|bits| bits.contains(old_doc)).unwrap_or(false);
            if !deleted {
                next += 1;
                doc_map[old_doc as usize] = next;
            }
        }
        doc_map
    }

    /// Discard all buffered state. The write lock releases; partial files
    /// wait for the next commit's purge.
    pub fn abort(mut self) -> Result<()> {
        if let Some(seg_writer) = self.seg_writer.take() {
            let name = seg_writer.segment().name().to_string();
            seg_writer.abort();
            let _ = delete_tree(&*self.folder, &name);
        }
        self.committed = true;
        self.write_lock.release()
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.write_lock.release();
        }
    }
}

fn read_stored_schema(folder: &dyn Folder, snapshot: &Snapshot) -> Result<Option<Schema>> {
    let mut best: Option<(u64, &str)> = None;
    for entry in snapshot.entries() {
        let Some(stem) = entry
            .strip_prefix("schema_")
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            continue;
        };
        if let Ok(number) = crate::util::base36::from_base36(stem) {
            if best.map(|(n, _)| number > n).unwrap_or(true) {
                best = Some((number, entry));
            }
        }
    }
    match best {
        None => Ok(None),
        Some((_, path)) => {
            let dump = slurp_json(folder, path, JsonOptions::default())?;
            Schema::load(&dump).map(Some)
        }
    }
}
