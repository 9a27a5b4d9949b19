pub mod compound;
pub mod folder;
pub mod fs_folder;
pub mod instream;
pub mod lock;
pub mod outstream;
pub mod ram_folder;

pub use folder::{DirEntry, DirHandle, Folder};
pub use fs_folder::FsFolder;
pub use instream::InStream;
pub use outstream::OutStream;
pub use ram_folder::RamFolder;
