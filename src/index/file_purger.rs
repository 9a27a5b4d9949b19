use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::core::error::Result;
use crate::index::segment::Segment;
use crate::index::snapshot::Snapshot;
use crate::store::folder::{delete_tree, list_names, Folder};
use crate::store::lock::LOCK_DIR;

/// Reference-counting garbage collector for index files. A file survives a
/// purge if any live snapshot references it; a snapshot is live if it is
/// the latest one or a reader lock pins it.
pub struct FilePurger {
    folder: Arc<dyn Folder>,
}

impl FilePurger {
    pub fn new(folder: Arc<dyn Folder>) -> Self {
        FilePurger { folder }
    }

    fn snapshot_is_pinned(&self, snapshot_file: &str) -> Result<bool> {
        if !self.folder.is_directory(LOCK_DIR) {
            return Ok(false);
        }
        let prefix = format!("{}-", snapshot_file);
        Ok(list_names(&*self.folder, LOCK_DIR)?
            .iter()
            .any(|name| name.starts_with(&prefix) && name.ends_with(".lock")))
    }

    /// Union the live snapshots' file sets and delete everything else.
    /// Unlink failures are logged and retried on the next purge, since the
    /// offending files stay unreferenced.
    pub fn purge(&self) -> Result<()> {
        let root_names = list_names(&*self.folder, "")?;

        let snapshot_files: Vec<&String> = root_names
            .iter()
            .filter(|name| Snapshot::is_snapshot_filename(name))
            .collect();
        let latest = Snapshot::latest_file(&*self.folder)?;

        let mut union: BTreeSet<String> = BTreeSet::new();
        for file in &snapshot_files {
            let is_latest = latest.as_deref() == Some(file.as_str());
            if !is_latest && !self.snapshot_is_pinned(file)? {
                continue;
            }
            let mut snapshot = Snapshot::new();
            snapshot.read_file(&*self.folder, Some(file.as_str()))?;
            union.insert((*file).clone());
            for entry in snapshot.entries() {
                union.insert(entry.to_string());
            }
        }

        for name in &root_names {
            if name == LOCK_DIR {
                continue;
            }
            if self.folder.is_directory(name) {
                if Segment::valid_seg_name(name) {
                    self.purge_segment_dir(name, &union)?;
                } else if !union.contains(name) {
                    self.try_delete_tree(name);
                }
            } else if !union.contains(name) {
                self.try_delete(name);
            }
        }
        Ok(())
    }

    /// Delete the whole directory when nothing references it; otherwise
    /// weed out unreferenced files inside (e.g. superseded tombstones).
    fn purge_segment_dir(&self, seg_name: &str, union: &BTreeSet<String>) -> Result<()> {
        let prefix = format!("{}/", seg_name);
        if !union.iter().any(|entry| entry.starts_with(&prefix)) {
            self.try_delete_tree(seg_name);
            return Ok(());
        }
        for file in list_names(&*self.folder, seg_name)? {
            let path = format!("{}/{}", seg_name, file);
            if !union.contains(&path) {
                self.try_delete(&path);
            }
        }
        Ok(())
    }

    fn try_delete(&self, path: &str) {
        if let Err(error) = self.folder.delete(path) {
            warn!(path, %error, "couldn't unlink; will retry next purge");
        }
    }

    fn try_delete_tree(&self, path: &str) {
        if let Err(error) = delete_tree(&*self.folder, path) {
            warn!(path, %error, "couldn't unlink; will retry next purge");
        }
    }
}
