use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::core::error::{Error, ErrorKind, Result};
use crate::store::folder::{list_names, Folder};
use crate::util::base36::{from_base36, to_base36};
use crate::util::json::{from_json, to_json, JsonOptions};

pub const SNAPSHOT_FORMAT: i64 = 1;

/// Manifest of every file belonging to one consistent view of the index.
/// Snapshots are the unit of atomic publication: nothing a snapshot
/// references is visible to new readers until the snapshot file itself has
/// been published via temp-write, fsync and rename.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: BTreeSet<String>,
    path: Option<String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    pub fn filename_for(number: u64) -> String {
        format!("snapshot_{}.json", to_base36(number))
    }

    pub fn number_of(filename: &str) -> Result<u64> {
        filename
            .strip_prefix("snapshot_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .ok_or_else(|| Error::decode(format!("Not a snapshot filename: '{}'", filename)))
            .and_then(from_base36)
    }

    pub fn is_snapshot_filename(name: &str) -> bool {
        Snapshot::number_of(name).is_ok()
    }

    /// Highest-numbered snapshot file in the index root, if any.
    pub fn latest_file(folder: &dyn Folder) -> Result<Option<String>> {
        let mut best: Option<(u64, String)> = None;
        for name in list_names(folder, "")? {
            if let Ok(number) = Snapshot::number_of(&name) {
                if best.as_ref().map(|(n, _)| number > *n).unwrap_or(true) {
                    best = Some((number, name));
                }
            }
        }
        Ok(best.map(|(_, name)| name))
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn number(&self) -> Result<u64> {
        match &self.path {
            Some(path) => Snapshot::number_of(path),
            None => Err(Error::internal("Snapshot has no path yet")),
        }
    }

    pub fn add_entry(&mut self, entry: impl Into<String>) {
        self.entries.insert(entry.into());
    }

    pub fn delete_entry(&mut self, entry: &str) -> bool {
        self.entries.remove(entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn entry_list(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Segment directory names referenced by this snapshot, ascending by
    /// segment number.
    pub fn segment_names(&self) -> Vec<String> {
        let mut names: BTreeSet<(u64, String)> = BTreeSet::new();
        for entry in &self.entries {
            let dir = match entry.find('/') {
                Some(idx) => &entry[..idx],
                None => continue,
            };
            if let Ok(number) = crate::index::segment::Segment::name_to_num(dir) {
                names.insert((number, dir.to_string()));
            }
        }
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// Read a snapshot manifest; `path == None` means the latest one. An
    /// index with no snapshot yet reads as an empty manifest.
    pub fn read_file(&mut self, folder: &dyn Folder, path: Option<&str>) -> Result<()> {
        let path = match path {
            Some(path) => Some(path.to_string()),
            None => Snapshot::latest_file(folder)?,
        };
        let Some(path) = path else {
            self.entries.clear();
            self.path = None;
            return Ok(());
        };

        let mut stream = folder.open_in(&path)?;
        let raw = stream.read_all()?;
        let text = std::str::from_utf8(&raw)
            .map_err(|_| Error::corrupt(format!("Invalid UTF-8 in '{}'", path)))?;
        let parsed = from_json(text, JsonOptions::default())
            .map_err(|e| Error::corrupt(format!("Can't parse '{}': {}", path, e.message)))?;

        let format = parsed.get("format").and_then(Value::as_i64).unwrap_or(0);
        if format > SNAPSHOT_FORMAT {
            return Err(Error::new(
                ErrorKind::UnsupportedFormat,
                format!("Snapshot format {} is newer than {}", format, SNAPSHOT_FORMAT),
            ));
        }
        let entries = parsed
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::corrupt(format!("Missing 'entries' in '{}'", path)))?;

        self.entries.clear();
        for entry in entries {
            let entry = entry
                .as_str()
                .ok_or_else(|| Error::corrupt(format!("Non-string entry in '{}'", path)))?;
            self.entries.insert(entry.to_string());
        }
        self.path = Some(path);
        Ok(())
    }

    /// Publish the manifest: write to a temp name, fsync, rename into
    /// place. Until the rename lands, the previous snapshot stays
    /// authoritative.
    pub fn write_file(&mut self, folder: &dyn Folder, path: &str) -> Result<()> {
        let manifest = json!({
            "entries": self.entry_list(),
            "format": SNAPSHOT_FORMAT,
        });
        let text = to_json(&manifest, JsonOptions::default())?;

        let temp = format!("{}.temp", path);
        let mut out = folder.open_out(&temp)?;
        out.write_bytes(text.as_bytes())?;
        out.close_sync()?;
        folder.rename(&temp, path)?;
        self.path = Some(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ram_folder::RamFolder;

    #[test]
    fn filenames_round_trip() {
        assert_eq!(Snapshot::filename_for(36), "snapshot_10.json");
        assert_eq!(Snapshot::number_of("snapshot_10.json").unwrap(), 36);
        assert!(!Snapshot::is_snapshot_filename("segmeta.json"));
        assert!(!Snapshot::is_snapshot_filename("snapshot_10.json.temp"));
    }

    #[test]
    fn write_then_read_back() {
        let folder = RamFolder::new("index");
        let mut snapshot = Snapshot::new();
        snapshot.add_entry("seg_1/segmeta.json");
        snapshot.add_entry("seg_1/cf.dat");
        snapshot.add_entry("schema_1.json");
        snapshot
            .write_file(&folder, "snapshot_1.json")
            .unwrap();

        // The temp file is gone after the rename.
        assert!(!folder.exists("snapshot_1.json.temp"));

        let mut read_back = Snapshot::new();
        read_back.read_file(&folder, None).unwrap();
        assert_eq!(read_back.path(), Some("snapshot_1.json"));
        assert_eq!(read_back.num_entries(), 3);
        assert!(read_back.contains("seg_1/cf.dat"));
        assert_eq!(read_back.segment_names(), vec!["seg_1"]);
    }

    #[test]
    fn latest_wins() {
        let folder = RamFolder::new("index");
        for number in [1u64, 3, 2] {
            let mut snapshot = Snapshot::new();
            snapshot.add_entry(format!("marker_{}", number));
            snapshot
                .write_file(&folder, &Snapshot::filename_for(number))
                .unwrap();
        }
        let mut snapshot = Snapshot::new();
        snapshot.read_file(&folder, None).unwrap();
        assert_eq!(snapshot.path(), Some("snapshot_3.json"));
        assert!(snapshot.contains("marker_3"));
    }

    #[test]
    fn missing_snapshot_reads_as_empty() {
        let folder = RamFolder::new("index");
        let mut snapshot = Snapshot::new();
        snapshot.read_file(&folder, None).unwrap();
        assert_eq!(snapshot.num_entries(), 0);
        assert!(snapshot.path().is_none());
    }

    #[test]
    fn newer_format_is_rejected() {
        let folder = RamFolder::new("index");
        let manifest = json!({"entries": [], "format": 99});
        crate::util::json::spew_json(
            &manifest,
            &folder,
            "snapshot_1.json",
            JsonOptions::default(),
        )
        .unwrap();

        let mut snapshot = Snapshot::new();
        let err = snapshot.read_file(&folder, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    }
}
