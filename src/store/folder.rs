use crate::core::error::{Error, ErrorKind, Result};
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;

/// One entry yielded by a [`DirHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Restartable iterator over the immediate children of one directory.
/// `.` and `..` are never yielded.
pub trait DirHandle {
    fn next_entry(&mut self) -> Result<Option<DirEntry>>;

    /// Rewind to the first entry.
    fn reset(&mut self) -> Result<()>;
}

/// Abstract directory of byte-addressable files. Paths are `/`-separated
/// and relative to the folder; implementations route multi-component paths
/// through their subfolders.
pub trait Folder: Send + Sync {
    fn open_in(&self, path: &str) -> Result<InStream>;

    fn open_out(&self, path: &str) -> Result<OutStream>;

    fn exists(&self, path: &str) -> bool;

    fn is_directory(&self, path: &str) -> bool;

    /// Delete a file or an empty directory.
    fn delete(&self, path: &str) -> Result<()>;

    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn mkdir(&self, path: &str) -> Result<()>;

    /// Open a handle on the directory at `path`; `""` is the folder itself.
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>>;

    /// Expose an existing subdirectory as a folder in its own right.
    fn find_folder(&self, path: &str) -> Result<Box<dyn Folder>>;

    /// Display path, for error messages.
    fn path(&self) -> &str;
}

/// Collect the names of a directory's immediate children, sorted.
pub fn list_names(folder: &dyn Folder, path: &str) -> Result<Vec<String>> {
    let mut dh = folder.open_dir(path)?;
    let mut names = Vec::new();
    while let Some(entry) = dh.next_entry()? {
        names.push(entry.name);
    }
    names.sort();
    Ok(names)
}

/// Recursively delete a directory and its contents.
pub fn delete_tree(folder: &dyn Folder, path: &str) -> Result<()> {
    if folder.is_directory(path) {
        let mut dh = folder.open_dir(path)?;
        while let Some(entry) = dh.next_entry()? {
            let child = format!("{}/{}", path, entry.name);
            if entry.is_dir {
                delete_tree(folder, &child)?;
            } else {
                folder.delete(&child)?;
            }
        }
    }
    folder.delete(path)
}

/// Split off the first component of a slash-separated path.
pub(crate) fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.find('/') {
        Some(idx) => (&path[..idx], Some(&path[idx + 1..])),
        None => (path, None),
    }
}

pub(crate) fn no_such_file(folder_path: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("No such file '{}' in '{}'", name, folder_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_components() {
        assert_eq!(split_path("seg_1/lexicon-1.dat"), ("seg_1", Some("lexicon-1.dat")));
        assert_eq!(split_path("segmeta.json"), ("segmeta.json", None));
        assert_eq!(split_path("a/b/c"), ("a", Some("b/c")));
    }
}
