use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::core::error::{Error, ErrorKind, Result};
use crate::store::folder::{list_names, Folder};
use crate::util::json::{slurp_json, spew_json, JsonOptions};

pub const LOCK_DIR: &str = "locks";

/// Makes locks scoped to one index directory. The host string identifies
/// this machine; locks held by other hosts are never broken.
pub struct LockFactory {
    folder: Arc<dyn Folder>,
    host: String,
}

impl LockFactory {
    pub fn new(folder: Arc<dyn Folder>, host: impl Into<String>) -> Self {
        LockFactory {
            folder,
            host: host.into(),
        }
    }

    pub fn make_lock(&self, name: &str, timeout_ms: u64, interval_ms: u64) -> Lock {
        Lock::new(
            Arc::clone(&self.folder),
            name,
            &self.host,
            timeout_ms,
            interval_ms,
            false,
        )
    }

    /// Shared locks under one name coexist; used by readers to pin the
    /// snapshot they bound to.
    pub fn make_shared_lock(&self, name: &str, timeout_ms: u64, interval_ms: u64) -> Lock {
        Lock::new(
            Arc::clone(&self.folder),
            name,
            &self.host,
            timeout_ms,
            interval_ms,
            true,
        )
    }
}

/// Filesystem-manifested mutual exclusion token. The lock file carries the
/// owner's host, pid and a timestamp; a reaper may break it once the owner
/// pid is dead and the timestamp has aged past the timeout.
pub struct Lock {
    folder: Arc<dyn Folder>,
    name: String,
    host: String,
    timeout: Duration,
    interval: Duration,
    shared: bool,
    lock_path: Option<String>,
}

impl Lock {
    fn new(
        folder: Arc<dyn Folder>,
        name: &str,
        host: &str,
        timeout_ms: u64,
        interval_ms: u64,
        shared: bool,
    ) -> Self {
        Lock {
            folder,
            name: name.to_string(),
            host: host.to_string(),
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms.max(1)),
            shared,
            lock_path: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn exclusive_path(&self) -> String {
        format!("{}/{}.lock", LOCK_DIR, self.name)
    }

    /// Retry until the lock is ours or the timeout lapses.
    pub fn obtain(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.request()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::new(
                    ErrorKind::LockFailure,
                    format!(
                        "Couldn't get lock '{}' within {} ms",
                        self.name,
                        self.timeout.as_millis()
                    ),
                ));
            }
            std::thread::sleep(self.interval);
        }
    }

    /// One attempt. Returns false on contention.
    pub fn request(&mut self) -> Result<bool> {
        if self.lock_path.is_some() {
            return Err(Error::new(
                ErrorKind::LockFailure,
                format!("Lock '{}' already obtained by this handle", self.name),
            ));
        }
        if !self.folder.exists(LOCK_DIR) {
            // A concurrent mkdir is fine; only a still-missing dir is not.
            let _ = self.folder.mkdir(LOCK_DIR);
            if !self.folder.is_directory(LOCK_DIR) {
                return Err(Error::io(format!(
                    "Can't create '{}' directory",
                    LOCK_DIR
                )));
            }
        }

        let target = if self.shared {
            // First free slot under this name.
            let mut tick = 1u32;
            loop {
                let candidate = format!("{}/{}-{}.lock", LOCK_DIR, self.name, tick);
                if !self.folder.exists(&candidate) {
                    break candidate;
                }
                tick += 1;
            }
        } else {
            let target = self.exclusive_path();
            if self.folder.exists(&target) {
                self.maybe_delete_file(&target, false, true)?;
                if self.folder.exists(&target) {
                    return Ok(false);
                }
            }
            target
        };

        let temp = format!("{}.temp{}", target, std::process::id());
        let content = json!({
            "host": self.host,
            "name": self.name,
            "pid": std::process::id(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        spew_json(&content, &*self.folder, &temp, JsonOptions::default())?;

        if !self.shared && self.folder.exists(&target) {
            // Lost the race since the check above.
            let _ = self.folder.delete(&temp);
            return Ok(false);
        }
        self.folder.rename(&temp, &target)?;
        self.lock_path = Some(target);
        Ok(true)
    }

    pub fn is_obtained(&self) -> bool {
        self.lock_path.is_some()
    }

    /// Whether anyone holds this lock name.
    pub fn is_locked(&self) -> Result<bool> {
        if self.shared {
            if !self.folder.is_directory(LOCK_DIR) {
                return Ok(false);
            }
            let prefix = format!("{}-", self.name);
            Ok(list_names(&*self.folder, LOCK_DIR)?
                .iter()
                .any(|entry| entry.starts_with(&prefix) && entry.ends_with(".lock")))
        } else {
            Ok(self.folder.exists(&self.exclusive_path()))
        }
    }

    pub fn release(&mut self) -> Result<()> {
        if let Some(path) = self.lock_path.take() {
            self.maybe_delete_file(&path, true, false)?;
        }
        Ok(())
    }

    /// Break stale locks under this name: dead owner pid on this host and
    /// a lock file older than the timeout.
    pub fn clear_stale(&self) -> Result<()> {
        if !self.folder.is_directory(LOCK_DIR) {
            return Ok(());
        }
        if self.shared {
            let prefix = format!("{}-", self.name);
            for entry in list_names(&*self.folder, LOCK_DIR)? {
                if entry.starts_with(&prefix) && entry.ends_with(".lock") {
                    self.maybe_delete_file(&format!("{}/{}", LOCK_DIR, entry), false, true)?;
                }
            }
            Ok(())
        } else {
            self.maybe_delete_file(&self.exclusive_path(), false, true)
        }
    }

    fn maybe_delete_file(&self, path: &str, delete_mine: bool, delete_dead: bool) -> Result<()> {
        if !self.folder.exists(path) {
            return Ok(());
        }
        let content = match slurp_json(&*self.folder, path, JsonOptions::default()) {
            Ok(content) => content,
            Err(_) => {
                // Unparseable lock files are treated as stale debris.
                warn!(lock = path, "clearing unreadable lock file");
                return self.folder.delete(path);
            }
        };
        let host = content.get("host").and_then(Value::as_str).unwrap_or("");
        if host != self.host {
            return Ok(());
        }
        let pid = content.get("pid").and_then(Value::as_u64).unwrap_or(0);
        let mine = pid == std::process::id() as u64;
        if delete_mine && mine {
            return self.folder.delete(path);
        }
        if delete_dead && !process_alive(pid) && self.aged_out(&content) {
            warn!(lock = path, pid, "breaking stale lock");
            return self.folder.delete(path);
        }
        Ok(())
    }

    fn aged_out(&self, content: &Value) -> bool {
        let Some(stamp) = content.get("timestamp").and_then(Value::as_str) else {
            return true;
        };
        match DateTime::parse_from_rfc3339(stamp) {
            Ok(written) => {
                let age = Utc::now().signed_duration_since(written.with_timezone(&Utc));
                age.num_milliseconds() >= 0
                    && age.num_milliseconds() as u128 > self.timeout.as_millis()
            }
            Err(_) => true,
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(unix)]
fn process_alive(pid: u64) -> bool {
    if pid == 0 || pid > i32::MAX as u64 {
        return false;
    }
    // Signal 0 probes for existence; EPERM still means the process exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u64) -> bool {
    // Without a liveness probe, never treat a lock owner as dead.
    true
}
