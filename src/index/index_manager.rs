use std::sync::Arc;

use crate::index::merge_policy::{MergePolicy, TieredMergePolicy};
use crate::store::folder::Folder;
use crate::store::lock::{Lock, LockFactory};

pub const WRITE_LOCK_NAME: &str = "write";

/// Policy holder for one index: lock identity and timeouts, and the merge
/// policy consulted at commit. One IndexManager serves both writers and
/// readers of a directory.
pub struct IndexManager {
    host: String,
    write_lock_timeout_ms: u64,
    write_lock_interval_ms: u64,
    merge_policy: Box<dyn MergePolicy>,
}

impl IndexManager {
    pub fn new(host: impl Into<String>) -> Self {
        IndexManager {
            host: host.into(),
            write_lock_timeout_ms: 1000,
            write_lock_interval_ms: 100,
            merge_policy: Box::new(TieredMergePolicy::default()),
        }
    }

    pub fn with_merge_policy(mut self, policy: Box<dyn MergePolicy>) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_write_lock_timeout(mut self, timeout_ms: u64, interval_ms: u64) -> Self {
        self.write_lock_timeout_ms = timeout_ms;
        self.write_lock_interval_ms = interval_ms;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn merge_policy(&self) -> &dyn MergePolicy {
        &*self.merge_policy
    }

    pub fn make_write_lock(&self, folder: Arc<dyn Folder>) -> Lock {
        LockFactory::new(folder, &self.host).make_lock(
            WRITE_LOCK_NAME,
            self.write_lock_timeout_ms,
            self.write_lock_interval_ms,
        )
    }

    /// Shared lock a reader holds on the snapshot it bound to, advisory to
    /// the purger.
    pub fn make_snapshot_read_lock(&self, folder: Arc<dyn Folder>, snapshot_file: &str) -> Lock {
        LockFactory::new(folder, &self.host).make_shared_lock(
            snapshot_file,
            self.write_lock_timeout_ms,
            self.write_lock_interval_ms,
        )
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        IndexManager::new(default_host())
    }
}

fn default_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
