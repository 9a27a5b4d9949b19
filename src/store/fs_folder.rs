use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;

use crate::core::error::{Error, Result};
use crate::store::folder::{DirEntry, DirHandle, Folder};
use crate::store::instream::{BytesSource, InStream, MmapSource};
use crate::store::outstream::{OutStream, WriteSink};

/// Native-filesystem folder. Reads go through a memory map shared by all
/// stream views; writes are plain buffered files.
pub struct FsFolder {
    root: PathBuf,
    display: String,
}

impl FsFolder {
    /// Open `root`, creating the directory if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let display = root.to_string_lossy().into_owned();
        Ok(FsFolder { root, display })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }
}

struct FsSink {
    file: File,
}

impl WriteSink for FsSink {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn finish(&mut self, sync: bool) -> Result<()> {
        self.file.flush()?;
        if sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Folder for FsFolder {
    fn open_in(&self, path: &str) -> Result<InStream> {
        let full = self.full_path(path);
        let file = File::open(&full)
            .map_err(|e| Error::io(format!("Can't open '{}': {}", full.display(), e)))?;
        let len = file.metadata()?.len();
        let name = format!("{}/{}", self.display, path);
        if len == 0 {
            // Zero-length maps are rejected on some platforms.
            return Ok(InStream::new(name, Arc::new(BytesSource(Bytes::new()))));
        }
        // Safety: the index protocol never mutates a file once readers can
        // see it; files are published whole via rename.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::io(format!("Can't mmap '{}': {}", full.display(), e)))?;
        Ok(InStream::new(name, Arc::new(MmapSource(map))))
    }

    fn open_out(&self, path: &str) -> Result<OutStream> {
        let full = self.full_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full)
            .map_err(|e| Error::io(format!("Can't create '{}': {}", full.display(), e)))?;
        Ok(OutStream::new(
            format!("{}/{}", self.display, path),
            Box::new(FsSink { file }),
        ))
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path).exists()
    }

    fn is_directory(&self, path: &str) -> bool {
        self.full_path(path).is_dir()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        let result = if full.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        result.map_err(|e| Error::io(format!("Can't delete '{}': {}", full.display(), e)))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_full = self.full_path(from);
        let to_full = self.full_path(to);
        fs::rename(&from_full, &to_full).map_err(|e| {
            Error::io(format!(
                "Can't rename '{}' to '{}': {}",
                from_full.display(),
                to_full.display(),
                e
            ))
        })
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        fs::create_dir(&full)
            .map_err(|e| Error::io(format!("Can't mkdir '{}': {}", full.display(), e)))
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>> {
        let full = self.full_path(path);
        Ok(Box::new(FsDirHandle::open(full)?))
    }

    fn find_folder(&self, path: &str) -> Result<Box<dyn Folder>> {
        if path.is_empty() {
            return Ok(Box::new(FsFolder {
                root: self.root.clone(),
                display: self.display.clone(),
            }));
        }
        let full = self.full_path(path);
        if !full.is_dir() {
            return Err(Error::io(format!(
                "No such directory '{}' in '{}'",
                path, self.display
            )));
        }
        FsFolder::new(full).map(|f| Box::new(f) as Box<dyn Folder>)
    }

    fn path(&self) -> &str {
        &self.display
    }
}

/// Directory iterator over `fs::read_dir`. The standard library already
/// omits `.` and `..` and surfaces the entry's file type without a `stat`
/// where the platform directory entry carries one.
pub struct FsDirHandle {
    dir: PathBuf,
    iter: fs::ReadDir,
}

impl FsDirHandle {
    fn open(dir: PathBuf) -> Result<Self> {
        let iter = fs::read_dir(&dir)
            .map_err(|e| Error::io(format!("Can't read dir '{}': {}", dir.display(), e)))?;
        Ok(FsDirHandle { dir, iter })
    }
}

impl DirHandle for FsDirHandle {
    fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        match self.iter.next() {
            None => Ok(None),
            Some(entry) => {
                let entry = entry?;
                let file_type = entry.file_type()?;
                let is_symlink = file_type.is_symlink();
                // A symlinked directory still counts as a directory entry.
                let is_dir = if is_symlink {
                    entry.path().is_dir()
                } else {
                    file_type.is_dir()
                };
                Ok(Some(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir,
                    is_symlink,
                }))
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.iter = fs::read_dir(&self.dir)
            .map_err(|e| Error::io(format!("Can't read dir '{}': {}", self.dir.display(), e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for FsFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsFolder").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::folder::list_names;
    use tempfile::TempDir;

    #[test]
    fn round_trip_through_real_files() {
        let tmp = TempDir::new().unwrap();
        let folder = FsFolder::new(tmp.path()).unwrap();

        let mut out = folder.open_out("data").unwrap();
        out.write_c32(4000).unwrap();
        out.write_string("fs").unwrap();
        out.close().unwrap();

        let mut stream = folder.open_in("data").unwrap();
        assert_eq!(stream.read_c32().unwrap(), 4000);
        assert_eq!(stream.read_string().unwrap(), "fs");
    }

    #[test]
    fn empty_file_reads_as_empty_stream() {
        let tmp = TempDir::new().unwrap();
        let folder = FsFolder::new(tmp.path()).unwrap();
        folder.open_out("empty").unwrap().close().unwrap();

        let stream = folder.open_in("empty").unwrap();
        assert_eq!(stream.length(), 0);
    }

    #[test]
    fn dir_handle_lists_and_restarts() {
        let tmp = TempDir::new().unwrap();
        let folder = FsFolder::new(tmp.path()).unwrap();
        folder.mkdir("sub").unwrap();
        folder.open_out("file").unwrap().close().unwrap();

        let mut dh = folder.open_dir("").unwrap();
        let mut first_pass = Vec::new();
        while let Some(entry) = dh.next_entry().unwrap() {
            if entry.name == "sub" {
                assert!(entry.is_dir);
            }
            first_pass.push(entry.name);
        }
        first_pass.sort();
        assert_eq!(first_pass, vec!["file", "sub"]);

        dh.reset().unwrap();
        assert!(dh.next_entry().unwrap().is_some());

        assert_eq!(list_names(&folder, "").unwrap(), vec!["file", "sub"]);
    }
}
