pub mod bool_matcher;
pub mod collector;
pub mod compiler;
pub mod hits;
pub mod matcher;
pub mod parser;
pub mod phrase_matcher;
pub mod query;
pub mod reader;
pub mod searcher;

pub use collector::{HitCollector, MatchDoc, SortCollector};
pub use compiler::{make_compiler, Compiler, Searchable};
pub use hits::{HitDoc, Hits};
pub use matcher::Matcher;
pub use parser::QueryParser;
pub use query::{BooleanQuery, Occur, Query};
pub use reader::IndexReader;
pub use searcher::IndexSearcher;
