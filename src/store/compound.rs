use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::core::error::{Error, ErrorKind, Result};
use crate::store::folder::{list_names, DirEntry, DirHandle, Folder};
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;
use crate::util::json::{slurp_json, spew_json, JsonOptions};

pub const CF_DAT: &str = "cf.dat";
pub const CF_META: &str = "cfmeta.json";

pub const CURRENT_FILE_FORMAT: i64 = 2;

/// Pack a segment's files into a single `cf.dat` body plus a `cfmeta.json`
/// records table, then delete the originals. `segmeta.json` stays loose so
/// a segment can be identified without opening the compound file.
pub struct CompoundFileWriter;

impl CompoundFileWriter {
    pub fn consolidate(folder: &dyn Folder) -> Result<()> {
        let names = list_names(folder, "")?;
        let mut records = BTreeMap::new();

        let mut cf_out = folder.open_out(CF_DAT)?;
        for name in &names {
            if name == "segmeta.json" || name == CF_DAT || name == CF_META {
                continue;
            }
            if folder.is_directory(name) {
                continue;
            }
            let offset = cf_out.tell();
            let mut stream = folder.open_in(name)?;
            let data = stream.read_all()?;
            cf_out.write_bytes(&data)?;
            records.insert(name.clone(), (offset, data.len() as u64));
        }
        cf_out.close()?;

        let files: serde_json::Map<String, Value> = records
            .iter()
            .map(|(name, (offset, length))| {
                (name.clone(), json!({"offset": offset, "length": length}))
            })
            .collect();
        let metadata = json!({"files": files, "format": CURRENT_FILE_FORMAT});
        spew_json(&metadata, folder, CF_META, JsonOptions::default())?;

        for name in records.keys() {
            folder.delete(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct CfRecord {
    offset: u64,
    length: u64,
}

/// Folder view over a compound file: virtual files resolve to bounded
/// windows of the shared `cf.dat` stream, everything else defers to the
/// wrapped real folder. Virtual and real names share one namespace.
pub struct CompoundFileReader {
    real: Box<dyn Folder>,
    records: RwLock<BTreeMap<String, CfRecord>>,
    instream: InStream,
    path: String,
}

impl fmt::Debug for CompoundFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundFileReader")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CompoundFileReader {
    pub fn open(real: Box<dyn Folder>) -> Result<Self> {
        let metadata = slurp_json(&*real, CF_META, JsonOptions::default())
            .map_err(|e| e.add_frame(format!("compound open '{}'", real.path())))?;

        let format = metadata
            .get("format")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "Corrupt {}: missing or invalid 'format'",
                    CF_META
                ))
            })?;
        if format < 1 {
            return Err(Error::corrupt(format!(
                "Corrupt {}: missing or invalid 'format'",
                CF_META
            )));
        }
        if format > CURRENT_FILE_FORMAT {
            return Err(Error::new(
                ErrorKind::UnsupportedFormat,
                format!(
                    "Unsupported compound file format: {} (current = {})",
                    format, CURRENT_FILE_FORMAT
                ),
            ));
        }

        let files = metadata
            .get("files")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::corrupt(format!("Corrupt {}: missing 'files' key", CF_META)))?;

        // Format 1 embedded a redundant directory-name prefix in the keys;
        // strip it so lookups use local names.
        let dir_prefix = format!(
            "{}/",
            real.path().rsplit(['/', '\\']).next().unwrap_or_default()
        );

        let mut records = BTreeMap::new();
        for (name, entry) in files {
            let offset = entry.get("offset").and_then(Value::as_u64);
            let length = entry.get("length").and_then(Value::as_u64);
            let (offset, length) = match (offset, length) {
                (Some(offset), Some(length)) => (offset, length),
                _ => {
                    return Err(Error::corrupt(format!(
                        "Malformed entry for '{}' in '{}'",
                        name,
                        real.path()
                    )));
                }
            };
            let local_name = if format == 1 && name.starts_with(&dir_prefix) {
                name[dir_prefix.len()..].to_string()
            } else {
                name.clone()
            };
            records.insert(local_name, CfRecord { offset, length });
        }

        let instream = real.open_in(CF_DAT)?;
        let path = real.path().to_string();
        Ok(CompoundFileReader {
            real,
            records: RwLock::new(records),
            instream,
            path,
        })
    }

    fn record(&self, name: &str) -> Option<CfRecord> {
        self.records.read().get(name).copied()
    }
}

impl Folder for CompoundFileReader {
    fn open_in(&self, path: &str) -> Result<InStream> {
        match self.record(path) {
            Some(record) => self.instream.reopen(
                format!("{}/{}", self.path, path),
                record.offset,
                record.length,
            ),
            None => self.real.open_in(path),
        }
    }

    fn open_out(&self, path: &str) -> Result<OutStream> {
        if self.record(path).is_some() {
            return Err(Error::io(format!(
                "Can't overwrite virtual file '{}' in '{}'",
                path, self.path
            )));
        }
        self.real.open_out(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.record(path).is_some() || self.real.exists(path)
    }

    fn is_directory(&self, path: &str) -> bool {
        self.record(path).is_none() && self.real.is_directory(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let removed = self.records.write().remove(path);
        match removed {
            None => self.real.delete(path),
            Some(_) => {
                // Once the last virtual file is dropped, the compound
                // files themselves go too.
                if self.records.read().is_empty() {
                    self.real.delete(CF_DAT)?;
                    self.real.delete(CF_META)?;
                }
                Ok(())
            }
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        if self.record(from).is_some() || self.record(to).is_some() {
            return Err(Error::io(format!(
                "Can't rename virtual file '{}' in '{}'",
                from, self.path
            )));
        }
        self.real.rename(from, to)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        if self.record(path).is_some() {
            return Err(Error::io(format!("Can't mkdir '{}': exists", path)));
        }
        self.real.mkdir(path)
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>> {
        if !path.is_empty() {
            return self.real.open_dir(path);
        }
        let mut entries: Vec<DirEntry> = self
            .records
            .read()
            .keys()
            .map(|name| DirEntry {
                name: name.clone(),
                is_dir: false,
                is_symlink: false,
            })
            .collect();
        let mut real_dh = self.real.open_dir("")?;
        while let Some(entry) = real_dh.next_entry()? {
            entries.push(entry);
        }
        Ok(Box::new(CfDirHandle { entries, tick: 0 }))
    }

    fn find_folder(&self, path: &str) -> Result<Box<dyn Folder>> {
        if self.record(path).is_some() {
            return Err(Error::io(format!(
                "'{}' in '{}' is not a directory",
                path, self.path
            )));
        }
        self.real.find_folder(path)
    }

    fn path(&self) -> &str {
        &self.path
    }
}

struct CfDirHandle {
    entries: Vec<DirEntry>,
    tick: usize,
}

impl DirHandle for CfDirHandle {
    fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        let entry = self.entries.get(self.tick).cloned();
        if entry.is_some() {
            self.tick += 1;
        }
        Ok(entry)
    }

    fn reset(&mut self) -> Result<()> {
        self.tick = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ram_folder::RamFolder;

    fn write_file(folder: &dyn Folder, name: &str, data: &[u8]) {
        let mut out = folder.open_out(name).unwrap();
        out.write_bytes(data).unwrap();
        out.close().unwrap();
    }

    fn seg_folder() -> RamFolder {
        let folder = RamFolder::new("seg_1");
        write_file(&folder, "alpha", b"alpha-data");
        write_file(&folder, "beta", b"beta!");
        write_file(&folder, "segmeta.json", b"{}\n");
        folder
    }

    #[test]
    fn consolidate_then_read_back_identical_bytes() {
        let folder = seg_folder();
        CompoundFileWriter::consolidate(&folder).unwrap();

        assert!(!folder.exists("alpha"));
        assert!(folder.exists(CF_DAT));
        assert!(folder.exists("segmeta.json"));

        let reader = CompoundFileReader::open(Box::new(folder)).unwrap();
        let mut stream = reader.open_in("alpha").unwrap();
        assert_eq!(stream.read_all().unwrap(), b"alpha-data");
        let mut stream = reader.open_in("beta").unwrap();
        assert_eq!(stream.read_all().unwrap(), b"beta!");
        // Real files still resolve through the same namespace.
        assert!(reader.exists("segmeta.json"));
    }

    #[test]
    fn virtual_files_cannot_be_overwritten() {
        let folder = seg_folder();
        CompoundFileWriter::consolidate(&folder).unwrap();
        let reader = CompoundFileReader::open(Box::new(folder)).unwrap();
        assert!(reader.open_out("alpha").is_err());
        assert!(reader.open_out("gamma").is_ok());
    }

    #[test]
    fn deleting_last_virtual_file_removes_compound_files() {
        let folder = seg_folder();
        CompoundFileWriter::consolidate(&folder).unwrap();
        let reader = CompoundFileReader::open(Box::new(folder.clone())).unwrap();
        reader.delete("alpha").unwrap();
        assert!(folder.exists(CF_DAT));
        reader.delete("beta").unwrap();
        assert!(!folder.exists(CF_DAT));
        assert!(!folder.exists(CF_META));
    }

    #[test]
    fn format_1_directory_prefix_is_stripped() {
        let folder = RamFolder::new("seg_1");
        write_file(&folder, CF_DAT, b"abcdef");
        let metadata = json!({
            "format": 1,
            "files": {
                "seg_1/inner": {"offset": 2, "length": 3}
            }
        });
        spew_json(&metadata, &folder, CF_META, JsonOptions::default()).unwrap();

        let reader = CompoundFileReader::open(Box::new(folder)).unwrap();
        let mut stream = reader.open_in("inner").unwrap();
        assert_eq!(stream.read_all().unwrap(), b"cde");
    }

    #[test]
    fn newer_format_is_rejected() {
        let folder = RamFolder::new("seg_1");
        write_file(&folder, CF_DAT, b"");
        let metadata = json!({"format": 99, "files": {}});
        spew_json(&metadata, &folder, CF_META, JsonOptions::default()).unwrap();

        let err = CompoundFileReader::open(Box::new(folder)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn missing_format_is_corrupt() {
        let folder = RamFolder::new("seg_1");
        write_file(&folder, CF_DAT, b"");
        let metadata = json!({"files": {}});
        spew_json(&metadata, &folder, CF_META, JsonOptions::default()).unwrap();

        let err = CompoundFileReader::open(Box::new(folder)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptFile);
    }
}
