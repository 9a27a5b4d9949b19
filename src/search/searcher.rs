use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::{DocId, Document};
use crate::index::index_manager::IndexManager;
use crate::plan::Schema;
use crate::search::collector::{HitCollector, SortCollector};
use crate::search::compiler::{make_compiler, Searchable};
use crate::search::hits::{HitDoc, Hits};
use crate::search::query::Query;
use crate::search::reader::IndexReader;
use crate::store::folder::Folder;

/// Executes queries against one bound snapshot: compile once, then run a
/// matcher per segment into the collector, skipping tombstoned docs.
pub struct IndexSearcher {
    reader: IndexReader,
}

impl IndexSearcher {
    pub fn new(reader: IndexReader) -> Self {
        IndexSearcher { reader }
    }

    /// Open against the latest snapshot in `folder`.
    pub fn open(folder: Arc<dyn Folder>, manager: &IndexManager) -> Result<IndexSearcher> {
        IndexReader::open(folder, manager).map(IndexSearcher::new)
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    pub fn fetch_doc(&self, doc_id: DocId) -> Result<Document> {
        self.reader.fetch_doc(doc_id)
    }

    /// Top hits for `query`: collect `offset + num_wanted`, then drop the
    /// first `offset`. An empty index yields zero hits, not an error.
    pub fn hits(&self, query: &Query, offset: usize, num_wanted: usize) -> Result<Hits> {
        let mut collector = SortCollector::new(offset + num_wanted);
        self.collect(query, &mut collector)?;
        let total_hits = collector.total_hits();

        let mut hit_docs = Vec::new();
        for match_doc in collector.pop_all().into_iter().skip(offset) {
            hit_docs.push(HitDoc {
                doc_id: match_doc.doc_id,
                score: match_doc.score,
                doc: self.reader.fetch_doc(match_doc.doc_id)?,
            });
        }
        Ok(Hits::new(hit_docs, total_hits))
    }

    /// Run the matcher tree into any collector.
    pub fn collect(&self, query: &Query, collector: &mut dyn HitCollector) -> Result<()> {
        if self.reader.doc_max() == 0 {
            return Ok(());
        }
        let compiler = make_compiler(query, self, 1.0, false)?;
        for (tick, seg_reader) in self.reader.seg_readers().iter().enumerate() {
            let base = self.reader.offsets()[tick];
            let Some(mut matcher) = compiler.make_matcher(seg_reader)? else {
                continue;
            };
            while let Some(local_doc) = matcher.next()? {
                if seg_reader.is_deleted(local_doc) {
                    continue;
                }
                collector.collect(base + local_doc, matcher.score());
            }
        }
        Ok(())
    }
}

impl Searchable for IndexSearcher {
    fn doc_max(&self) -> u64 {
        self.reader.doc_max()
    }

    fn doc_freq(&self, field: &str, term: &str) -> Result<u64> {
        self.reader.doc_freq(field, term)
    }

    fn schema(&self) -> &Schema {
        self.reader.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::merge_policy::AlwaysMergePolicy;
    use crate::index::{Indexer, OpenMode};
    use crate::plan::{Architecture, FieldType};
    use crate::search::parser::QueryParser;
    use crate::store::ram_folder::RamFolder;

    const LOREM: [(&str, &str); 4] = [
        (
            "Lorem ipsum",
            "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
             tempor incididunt ut labore et dolore magna aliqua.",
        ),
        (
            "Ut enim",
            "Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi \
             ut aliquip ex ea commodo consequat.",
        ),
        (
            "Duis aute",
            "Duis aute irure dolor in reprehenderit in voluptate velit esse cillum \
             dolore eu fugiat nulla pariatur.",
        ),
        (
            "Excepteur sint",
            "Excepteur sint occaecat cupidatat non proident, sunt in culpa qui \
             officia deserunt mollit anim id est laborum.",
        ),
    ];

    fn lorem_schema() -> Schema {
        let mut schema = Schema::new();
        schema.spec_field("title", FieldType::plain_text()).unwrap();
        schema
            .spec_field("content", FieldType::plain_text())
            .unwrap();
        schema
    }

    fn index_lorem(folder: &Arc<RamFolder>, arch: Architecture) {
        let mut indexer = Indexer::open(
            lorem_schema(),
            Arc::clone(folder) as Arc<dyn Folder>,
            Arc::new(IndexManager::new("tests")),
            arch,
            OpenMode::Create,
        )
        .unwrap();
        for (title, content) in LOREM {
            let mut doc = Document::new();
            doc.add_field("title", title);
            doc.add_field("content", content);
            indexer.add_doc(&doc).unwrap();
        }
        indexer.commit().unwrap();
    }

    fn open_searcher(folder: &Arc<RamFolder>) -> IndexSearcher {
        IndexSearcher::open(
            Arc::clone(folder) as Arc<dyn Folder>,
            &IndexManager::new("tests"),
        )
        .unwrap()
    }

    fn titles(hits: &Hits) -> Vec<String> {
        hits.iter()
            .map(|hit| {
                hit.doc
                    .get_field("title")
                    .and_then(|value| value.as_text())
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn single_term_finds_single_doc() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        let hits = searcher
            .hits(&Query::term("content", "ullamco"), 0, 10)
            .unwrap();
        assert_eq!(hits.total_hits(), 1);
        assert_eq!(titles(&hits), vec!["Ut enim"]);
    }

    #[test]
    fn or_query_unions_docs() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        let query = Query::or(vec![
            Query::term("content", "ut"),
            Query::term("content", "laborum"),
        ]);
        let hits = searcher.hits(&query, 0, 10).unwrap();
        assert!(hits.total_hits() >= 2);
        let titles = titles(&hits);
        assert!(titles.contains(&"Lorem ipsum".to_string()));
        assert!(titles.contains(&"Excepteur sint".to_string()));
        assert!(titles.contains(&"Ut enim".to_string()));
    }

    #[test]
    fn phrase_query_requires_adjacency() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        let hits = searcher
            .hits(&Query::phrase("content", &["fugiat", "nulla"]), 0, 10)
            .unwrap();
        assert_eq!(hits.total_hits(), 1);
        assert_eq!(titles(&hits), vec!["Duis aute"]);

        // Same words, wrong order: no hits.
        let hits = searcher
            .hits(&Query::phrase("content", &["nulla", "fugiat"]), 0, 10)
            .unwrap();
        assert_eq!(hits.total_hits(), 0);
    }

    #[test]
    fn parsed_queries_run_through_field_analyzers() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        let parser = QueryParser::new(Arc::clone(searcher.reader().schema()));
        let query = parser.parse(r#"content:"Fugiat Nulla""#).unwrap();
        let hits = searcher.hits(&query, 0, 10).unwrap();
        assert_eq!(titles(&hits), vec!["Duis aute"]);

        let query = parser.parse("content:ut OR content:laborum").unwrap();
        assert!(searcher.hits(&query, 0, 10).unwrap().total_hits() >= 2);
    }

    #[test]
    fn boolean_must_not_excludes() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        // Docs with "dolor" but not "lorem": doc 3 only.
        let mut bool_query = crate::search::query::BooleanQuery::new();
        bool_query.add(crate::search::query::Occur::Must, Query::term("content", "dolor"));
        bool_query.add(
            crate::search::query::Occur::MustNot,
            Query::term("content", "lorem"),
        );
        let hits = searcher
            .hits(&Query::Boolean(bool_query), 0, 10)
            .unwrap();
        assert_eq!(titles(&hits), vec!["Duis aute"]);
    }

    #[test]
    fn match_all_and_range() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::plain_files());
        let searcher = open_searcher(&folder);

        let hits = searcher.hits(&Query::match_all(), 0, 10).unwrap();
        assert_eq!(hits.total_hits(), 4);

        // Terms in ["u", "v"): ullamco, ut, and friends; not veniam.
        let query = Query::range("content", Some("u"), Some("v"), true, false);
        let hits = searcher.hits(&query, 0, 10).unwrap();
        assert_eq!(hits.total_hits(), 2);

        let hits = searcher.hits(&Query::no_match(), 0, 10).unwrap();
        assert_eq!(hits.total_hits(), 0);
    }

    #[test]
    fn offset_pages_past_leading_hits() {
        let folder = Arc::new(RamFolder::new("index"));
        index_lorem(&folder, Architecture::default());
        let searcher = open_searcher(&folder);

        let all = searcher.hits(&Query::match_all(), 0, 10).unwrap();
        let paged = searcher.hits(&Query::match_all(), 2, 10).unwrap();
        assert_eq!(paged.total_hits(), 4);
        assert_eq!(paged.len(), 2);
        assert_eq!(paged.get(0), all.get(2));
    }

    #[test]
    fn native_filesystem_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let folder: Arc<dyn Folder> =
            Arc::new(crate::store::fs_folder::FsFolder::new(tmp.path()).unwrap());

        let mut indexer = Indexer::open(
            lorem_schema(),
            Arc::clone(&folder),
            Arc::new(IndexManager::new("tests")),
            Architecture::default(),
            OpenMode::Create,
        )
        .unwrap();
        for (title, content) in LOREM {
            let mut doc = Document::new();
            doc.add_field("title", title);
            doc.add_field("content", content);
            indexer.add_doc(&doc).unwrap();
        }
        indexer.commit().unwrap();

        let searcher =
            IndexSearcher::open(Arc::clone(&folder), &IndexManager::new("tests")).unwrap();
        let hits = searcher
            .hits(&Query::term("content", "ullamco"), 0, 10)
            .unwrap();
        assert_eq!(titles(&hits), vec!["Ut enim"]);
        // The segment went to disk packed.
        assert!(folder.exists("seg_1/cf.dat"));
        assert!(tmp.path().join("snapshot_1.json").is_file());
    }

    #[test]
    fn empty_index_returns_zero_hits() {
        let folder = Arc::new(RamFolder::new("index"));
        let searcher = open_searcher(&folder);
        let hits = searcher
            .hits(&Query::term("content", "anything"), 0, 10)
            .unwrap();
        assert_eq!(hits.total_hits(), 0);
    }

    #[test]
    fn deleted_docs_never_match() {
        let folder = Arc::new(RamFolder::new("index"));
        let manager = Arc::new(IndexManager::new("tests"));

        let parity_schema = || {
            let mut schema = Schema::new();
            schema
                .spec_field("content", FieldType::plain_text())
                .unwrap();
            schema
                .spec_field("parity", FieldType::plain_text())
                .unwrap();
            schema
        };

        let mut indexer = Indexer::open(
            parity_schema(),
            Arc::clone(&folder) as Arc<dyn Folder>,
            Arc::clone(&manager),
            Architecture::default(),
            OpenMode::Create,
        )
        .unwrap();
        for tick in 1..=1000u32 {
            let mut doc = Document::new();
            doc.add_field("content", format!("entry number {}", tick));
            doc.add_field("parity", if tick % 2 == 0 { "even" } else { "odd" });
            indexer.add_doc(&doc).unwrap();
        }
        indexer.commit().unwrap();

        let mut indexer = Indexer::open(
            parity_schema(),
            Arc::clone(&folder) as Arc<dyn Folder>,
            Arc::clone(&manager),
            Architecture::default(),
            OpenMode::Open,
        )
        .unwrap();
        indexer.delete_by_term("parity", "even").unwrap();
        indexer.commit().unwrap();

        let searcher = open_searcher(&folder);
        assert_eq!(searcher.reader().doc_count(), 500);
        assert_eq!(searcher.reader().del_count(), 500);

        let hits = searcher
            .hits(&Query::term("parity", "even"), 0, 10)
            .unwrap();
        assert_eq!(hits.total_hits(), 0);

        let hits = searcher
            .hits(&Query::term("content", "entry"), 0, 1000)
            .unwrap();
        assert_eq!(hits.total_hits(), 500);
    }

    #[test]
    fn merge_folds_segments_and_renumbers() {
        let folder = Arc::new(RamFolder::new("index"));
        let manager =
            Arc::new(IndexManager::new("tests").with_merge_policy(Box::new(AlwaysMergePolicy)));

        for (tick, (title, content)) in LOREM.iter().enumerate() {
            let mut indexer = Indexer::open(
                lorem_schema(),
                Arc::clone(&folder) as Arc<dyn Folder>,
                Arc::clone(&manager),
                Architecture::default(),
                if tick == 0 {
                    OpenMode::Create
                } else {
                    OpenMode::Open
                },
            )
            .unwrap();
            let mut doc = Document::new();
            doc.add_field("title", *title);
            doc.add_field("content", *content);
            indexer.add_doc(&doc).unwrap();
            indexer.commit().unwrap();
        }

        let searcher = open_searcher(&folder);
        // Each commit merges all committed segments: one merged segment
        // plus the commit's own.
        assert!(searcher.reader().seg_readers().len() <= 2);
        assert_eq!(searcher.reader().doc_count(), 4);

        let hits = searcher
            .hits(&Query::term("content", "ullamco"), 0, 10)
            .unwrap();
        assert_eq!(titles(&hits), vec!["Ut enim"]);

        let hits = searcher
            .hits(&Query::phrase("content", &["fugiat", "nulla"]), 0, 10)
            .unwrap();
        assert_eq!(titles(&hits), vec!["Duis aute"]);
    }
}
