//! Embedded inverted-index full-text search: analysis chains invert
//! documents into sorted posting accumulators, a single writer flushes
//! and merges immutable segments, snapshots publish index states
//! atomically, and queries compile into per-segment matcher trees scored
//! with TF-IDF.

pub mod analysis;
pub mod codec;
pub mod core;
pub mod index;
pub mod plan;
pub mod search;
pub mod store;
pub mod util;

pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, Document, FieldValue};
pub use crate::index::{IndexManager, Indexer, OpenMode};
pub use crate::plan::{Architecture, FieldType, Schema};
pub use crate::search::{IndexSearcher, Query, QueryParser};
pub use crate::store::{Folder, FsFolder, RamFolder};
