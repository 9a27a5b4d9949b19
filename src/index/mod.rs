pub mod deletions;
pub mod doc_reader;
pub mod doc_writer;
pub mod file_purger;
pub mod highlight;
pub mod index_manager;
pub mod indexer;
pub mod inverter;
pub mod lexicon;
pub mod merge_policy;
pub mod posting;
pub mod posting_reader;
pub mod posting_writer;
pub mod seg_reader;
pub mod seg_writer;
pub mod segment;
pub mod similarity;
pub mod snapshot;
pub mod term_info;
pub mod term_stepper;

pub use index_manager::IndexManager;
pub use indexer::{Indexer, OpenMode};
pub use merge_policy::{MergePolicy, SegmentCandidate, TieredMergePolicy};
pub use seg_reader::SegReader;
pub use similarity::Similarity;
pub use snapshot::Snapshot;
