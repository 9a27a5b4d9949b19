use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::core::error::{Error, Result};
use crate::store::folder::{no_such_file, split_path, DirEntry, DirHandle, Folder};
use crate::store::instream::{BytesSource, InStream};
use crate::store::outstream::{OutStream, VecSink};

/// In-memory folder tree. Clones share the same entry map, so a clone works
/// like a second handle on the same directory.
#[derive(Clone)]
pub struct RamFolder {
    path: String,
    entries: Arc<RwLock<BTreeMap<String, RamEntry>>>,
}

#[derive(Clone)]
enum RamEntry {
    File(Bytes),
    Dir(RamFolder),
}

impl RamFolder {
    pub fn new(path: impl Into<String>) -> Self {
        RamFolder {
            path: path.into(),
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Descend to the folder owning the last path component.
    fn resolve(&self, path: &str) -> Result<(RamFolder, String)> {
        let (head, rest) = split_path(path);
        match rest {
            None => Ok((self.clone(), head.to_string())),
            Some(rest) => {
                let child = {
                    let entries = self.entries.read();
                    match entries.get(head) {
                        Some(RamEntry::Dir(dir)) => dir.clone(),
                        Some(RamEntry::File(_)) => {
                            return Err(Error::io(format!(
                                "'{}' in '{}' is not a directory",
                                head, self.path
                            )));
                        }
                        None => return Err(no_such_file(&self.path, head)),
                    }
                };
                child.resolve(rest)
            }
        }
    }
}

impl Folder for RamFolder {
    fn open_in(&self, path: &str) -> Result<InStream> {
        let (owner, name) = self.resolve(path)?;
        let entries = owner.entries.read();
        match entries.get(&name) {
            Some(RamEntry::File(data)) => Ok(InStream::new(
                format!("{}/{}", self.path, path),
                Arc::new(BytesSource(data.clone())),
            )),
            _ => Err(no_such_file(&self.path, path)),
        }
    }

    fn open_out(&self, path: &str) -> Result<OutStream> {
        let (owner, name) = self.resolve(path)?;
        if let Some(RamEntry::Dir(_)) = owner.entries.read().get(&name) {
            return Err(Error::io(format!(
                "Can't open '{}' in '{}': is a directory",
                path, self.path
            )));
        }
        let entries = Arc::clone(&owner.entries);
        let publish_name = name;
        let sink = VecSink::new(Box::new(move |data: Vec<u8>| {
            entries
                .write()
                .insert(publish_name.clone(), RamEntry::File(Bytes::from(data)));
            Ok(())
        }));
        Ok(OutStream::new(
            format!("{}/{}", self.path, path),
            Box::new(sink),
        ))
    }

    fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((owner, name)) => owner.entries.read().contains_key(&name),
            Err(_) => false,
        }
    }

    fn is_directory(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((owner, name)) => {
                matches!(owner.entries.read().get(&name), Some(RamEntry::Dir(_)))
            }
            Err(_) => false,
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let (owner, name) = self.resolve(path)?;
        let mut entries = owner.entries.write();
        match entries.get(&name) {
            Some(RamEntry::Dir(dir)) => {
                if !dir.entries.read().is_empty() {
                    return Err(Error::io(format!(
                        "Can't delete non-empty directory '{}'",
                        path
                    )));
                }
            }
            Some(RamEntry::File(_)) => {}
            None => return Err(no_such_file(&self.path, path)),
        }
        entries.remove(&name);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from_owner, from_name) = self.resolve(from)?;
        let entry = from_owner
            .entries
            .write()
            .remove(&from_name)
            .ok_or_else(|| no_such_file(&self.path, from))?;
        let (to_owner, to_name) = self.resolve(to)?;
        to_owner.entries.write().insert(to_name, entry);
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let (owner, name) = self.resolve(path)?;
        let mut entries = owner.entries.write();
        if entries.contains_key(&name) {
            return Err(Error::io(format!(
                "Can't mkdir '{}' in '{}': exists",
                path, self.path
            )));
        }
        let dir = RamFolder::new(format!("{}/{}", self.path, path));
        entries.insert(name, RamEntry::Dir(dir));
        Ok(())
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>> {
        let target = if path.is_empty() {
            self.clone()
        } else {
            let (owner, name) = self.resolve(path)?;
            let entries = owner.entries.read();
            match entries.get(&name) {
                Some(RamEntry::Dir(dir)) => dir.clone(),
                _ => return Err(no_such_file(&self.path, path)),
            }
        };
        let snapshot: Vec<DirEntry> = target
            .entries
            .read()
            .iter()
            .map(|(name, entry)| DirEntry {
                name: name.clone(),
                is_dir: matches!(entry, RamEntry::Dir(_)),
                is_symlink: false,
            })
            .collect();
        Ok(Box::new(RamDirHandle {
            entries: snapshot,
            tick: 0,
        }))
    }

    fn find_folder(&self, path: &str) -> Result<Box<dyn Folder>> {
        if path.is_empty() {
            return Ok(Box::new(self.clone()));
        }
        let (owner, name) = self.resolve(path)?;
        let entries = owner.entries.read();
        match entries.get(&name) {
            Some(RamEntry::Dir(dir)) => Ok(Box::new(dir.clone())),
            _ => Err(no_such_file(&self.path, path)),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

struct RamDirHandle {
    entries: Vec<DirEntry>,
    tick: usize,
}

impl DirHandle for RamDirHandle {
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
    use crate::store::folder::list_names;

    #[test]
    fn write_then_read() {
        let folder = RamFolder::new("ram");
        let mut out = folder.open_out("greeting").unwrap();
        out.write_string("hello").unwrap();
        out.close().unwrap();

        let mut stream = folder.open_in("greeting").unwrap();
        assert_eq!(stream.read_string().unwrap(), "hello");
    }

    #[test]
    fn nothing_visible_until_close() {
        let folder = RamFolder::new("ram");
        let mut out = folder.open_out("pending").unwrap();
        out.write_u32(1).unwrap();
        assert!(!folder.exists("pending"));
        out.close().unwrap();
        assert!(folder.exists("pending"));
    }

    #[test]
    fn nested_paths_route_through_subfolders() {
        let folder = RamFolder::new("ram");
        folder.mkdir("seg_1").unwrap();
        let mut out = folder.open_out("seg_1/data").unwrap();
        out.write_u8(9).unwrap();
        out.close().unwrap();

        assert!(folder.exists("seg_1/data"));
        assert!(folder.is_directory("seg_1"));
        let sub = folder.find_folder("seg_1").unwrap();
        assert!(sub.exists("data"));
        assert_eq!(list_names(&*sub, "").unwrap(), vec!["data"]);

        // Missing intermediate directories are an error, not an implicit mkdir.
        assert!(folder.open_out("seg_2/data").is_err());
    }

    #[test]
    fn rename_replaces_target() {
        let folder = RamFolder::new("ram");
        for (name, val) in [("a", 1u8), ("b", 2u8)] {
            let mut out = folder.open_out(name).unwrap();
            out.write_u8(val).unwrap();
            out.close().unwrap();
        }
        folder.rename("a", "b").unwrap();
        assert!(!folder.exists("a"));
        let mut stream = folder.open_in("b").unwrap();
        assert_eq!(stream.read_u8().unwrap(), 1);
    }

    #[test]
    fn delete_refuses_non_empty_dir() {
        let folder = RamFolder::new("ram");
        folder.mkdir("dir").unwrap();
        let mut out = folder.open_out("dir/file").unwrap();
        out.write_u8(0).unwrap();
        out.close().unwrap();

        assert!(folder.delete("dir").is_err());
        folder.delete("dir/file").unwrap();
        folder.delete("dir").unwrap();
    }
}
