use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::index::seg_reader::SegReader;
use crate::index::similarity::Similarity;
use crate::plan::Schema;
use crate::search::bool_matcher::{AndMatcher, OrMatcher, ReqOptMatcher};
use crate::search::matcher::{
    ConstScoreMatcher, MatchAllMatcher, Matcher, NotMatcher, TermMatcher,
};
use crate::search::phrase_matcher::PhraseMatcher;
use crate::search::query::{Query, RangeQuery};

/// Index-wide statistics a compiler needs: the searcher implements this.
pub trait Searchable {
    fn doc_max(&self) -> u64;

    fn doc_freq(&self, field: &str, term: &str) -> Result<u64>;

    fn schema(&self) -> &Schema;
}

/// A query compiled against one searcher's statistics. Compilers carry
/// the weights; matchers they make carry the per-segment streams.
pub trait Compiler {
    fn sum_of_squared_weights(&self) -> f32;

    fn apply_norm_factor(&mut self, factor: f32);

    /// Normalized weight after `apply_norm_factor`.
    fn weight(&self) -> f32;

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>>;
}

/// Compile a query. Top-level calls (`subordinate == false`) normalize:
/// sum of squared weights, reciprocal square root, applied down the tree
/// so scores are comparable across queries.
pub fn make_compiler(
    query: &Query,
    searcher: &dyn Searchable,
    boost: f32,
    subordinate: bool,
) -> Result<Box<dyn Compiler>> {
    let sim = searcher.schema().similarity();
    let mut compiler = compile(query, searcher, boost)?;
    if !subordinate {
        let factor = sim.query_norm(compiler.sum_of_squared_weights());
        compiler.apply_norm_factor(factor);
    }
    Ok(compiler)
}

fn compile(query: &Query, searcher: &dyn Searchable, boost: f32) -> Result<Box<dyn Compiler>> {
    let sim = searcher.schema().similarity();
    match query {
        Query::Term(q) => Ok(Box::new(TermCompiler::new(
            &q.field,
            &q.term,
            searcher,
            boost * q.boost,
        )?)),
        Query::Phrase(q) => {
            if q.terms.len() == 1 {
                // One-term "phrases" degenerate to term queries.
                return Ok(Box::new(TermCompiler::new(
                    &q.field,
                    &q.terms[0],
                    searcher,
                    boost * q.boost,
                )?));
            }
            Ok(Box::new(PhraseCompiler::new(q, searcher, boost * q.boost)?))
        }
        Query::Boolean(q) => compile(&q.rewrite(), searcher, boost),
        Query::And(q) => {
            let children = q
                .children
                .iter()
                .map(|child| compile(child, searcher, boost * q.boost))
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(AndCompiler { children }))
        }
        Query::Or(q) => {
            let children = q
                .children
                .iter()
                .map(|child| compile(child, searcher, boost * q.boost))
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(OrCompiler { children, sim }))
        }
        Query::Not(q) => Ok(Box::new(NotCompiler {
            negand: compile(&q.negand, searcher, boost * q.boost)?,
        })),
        Query::MatchAll(_) => Ok(Box::new(MatchAllCompiler)),
        Query::NoMatch(_) => Ok(Box::new(NoMatchCompiler)),
        Query::Range(q) => Ok(Box::new(RangeCompiler::new(q, sim, boost * q.boost))),
        Query::ReqOpt(q) => Ok(Box::new(ReqOptCompiler {
            required: compile(&q.required, searcher, boost * q.boost)?,
            optional: compile(&q.optional, searcher, boost * q.boost)?,
        })),
        Query::Leaf(q) => Err(Error::bad_argument(format!(
            "Leaf query '{}' must be expanded against a schema before compiling",
            q.text
        ))),
    }
}

struct TermCompiler {
    field: String,
    term: String,
    sim: Arc<Similarity>,
    idf: f32,
    raw_weight: f32,
    normalized_weight: f32,
}

impl TermCompiler {
    fn new(field: &str, term: &str, searcher: &dyn Searchable, boost: f32) -> Result<Self> {
        let sim = searcher.schema().similarity();
        let doc_freq = searcher.doc_freq(field, term)?;
        let idf = sim.idf(doc_freq, searcher.doc_max());
        let raw_weight = idf * boost;
        Ok(TermCompiler {
            field: field.to_string(),
            term: term.to_string(),
            sim,
            idf,
            raw_weight,
            normalized_weight: raw_weight,
        })
    }
}

impl Compiler for TermCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.raw_weight * self.raw_weight
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        self.normalized_weight = self.raw_weight * self.idf * factor;
    }

    fn weight(&self) -> f32 {
        self.normalized_weight
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        match reader.postings(&self.field, &self.term)? {
            None => Ok(None),
            Some(plist) => Ok(Some(Box::new(TermMatcher::new(
                plist,
                self.normalized_weight,
                Arc::clone(&self.sim),
            )))),
        }
    }
}

struct PhraseCompiler {
    field: String,
    terms: Vec<String>,
    sim: Arc<Similarity>,
    idf: f32,
    raw_weight: f32,
    normalized_weight: f32,
    positions_available: bool,
}

impl PhraseCompiler {
    fn new(
        query: &crate::search::query::PhraseQuery,
        searcher: &dyn Searchable,
        boost: f32,
    ) -> Result<Self> {
        let sim = searcher.schema().similarity();
        let doc_max = searcher.doc_max();
        let mut idf = 0.0f32;
        for term in &query.terms {
            idf += sim.idf(searcher.doc_freq(&query.field, term)?, doc_max);
        }
        let raw_weight = idf * boost;
        let positions_available = searcher
            .schema()
            .fetch_type(&query.field)
            .map(|ftype| ftype.posting_variant().has_positions())
            .unwrap_or(false);
        Ok(PhraseCompiler {
            field: query.field.clone(),
            terms: query.terms.clone(),
            sim,
            idf,
            raw_weight,
            normalized_weight: raw_weight,
            positions_available,
        })
    }
}

impl Compiler for PhraseCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.raw_weight * self.raw_weight
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        self.normalized_weight = self.raw_weight * self.idf * factor;
    }

    fn weight(&self) -> f32 {
        self.normalized_weight
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        // Phrases need positions; a field indexed without them simply
        // produces no matches.
        if !self.positions_available || self.terms.is_empty() {
            return Ok(None);
        }
        let mut plists = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match reader.postings(&self.field, term)? {
                // Every term must be present in the segment.
                None => return Ok(None),
                Some(plist) if plist.doc_freq() == 0 => return Ok(None),
                Some(plist) => plists.push(plist),
            }
        }
        Ok(Some(Box::new(PhraseMatcher::new(
            plists,
            self.normalized_weight,
            Arc::clone(&self.sim),
        ))))
    }
}

struct AndCompiler {
    children: Vec<Box<dyn Compiler>>,
}

impl Compiler for AndCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.children
            .iter()
            .map(|child| child.sum_of_squared_weights())
            .sum()
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        for child in &mut self.children {
            child.apply_norm_factor(factor);
        }
    }

    fn weight(&self) -> f32 {
        self.children.iter().map(|child| child.weight()).sum()
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        let mut matchers = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match child.make_matcher(reader)? {
                // A missing required stream empties the conjunction.
                None => return Ok(None),
                Some(matcher) => matchers.push(matcher),
            }
        }
        match matchers.len() {
            0 => Ok(None),
            1 => Ok(matchers.pop()),
            _ => Ok(Some(Box::new(AndMatcher::new(matchers)))),
        }
    }
}

struct OrCompiler {
    children: Vec<Box<dyn Compiler>>,
    sim: Arc<Similarity>,
}

impl Compiler for OrCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.children
            .iter()
            .map(|child| child.sum_of_squared_weights())
            .sum()
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        for child in &mut self.children {
            child.apply_norm_factor(factor);
        }
    }

    fn weight(&self) -> f32 {
        self.children.iter().map(|child| child.weight()).sum()
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        let mut matchers = Vec::with_capacity(self.children.len());
        for child in &self.children {
            if let Some(matcher) = child.make_matcher(reader)? {
                matchers.push(matcher);
            }
        }
        match matchers.len() {
            0 => Ok(None),
            1 => Ok(matchers.pop()),
            _ => Ok(Some(Box::new(OrMatcher::new(
                matchers,
                Arc::clone(&self.sim),
            )))),
        }
    }
}

struct NotCompiler {
    negand: Box<dyn Compiler>,
}

impl Compiler for NotCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        0.0
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        self.negand.apply_norm_factor(factor);
    }

    fn weight(&self) -> f32 {
        0.0
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        let negand = self.negand.make_matcher(reader)?;
        Ok(Some(Box::new(NotMatcher::new(
            negand,
            reader.doc_max(),
        ))))
    }
}

struct MatchAllCompiler;

impl Compiler for MatchAllCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        0.0
    }

    fn apply_norm_factor(&mut self, _factor: f32) {}

    fn weight(&self) -> f32 {
        0.0
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        Ok(Some(Box::new(MatchAllMatcher::new(reader.doc_max(), 0.0))))
    }
}

struct NoMatchCompiler;

impl Compiler for NoMatchCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        0.0
    }

    fn apply_norm_factor(&mut self, _factor: f32) {}

    fn weight(&self) -> f32 {
        0.0
    }

    fn make_matcher(&self, _reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        Ok(None)
    }
}

struct RangeCompiler {
    query: RangeQuery,
    sim: Arc<Similarity>,
    raw_weight: f32,
    normalized_weight: f32,
}

impl RangeCompiler {
    fn new(query: &RangeQuery, sim: Arc<Similarity>, boost: f32) -> Self {
        RangeCompiler {
            query: query.clone(),
            sim,
            raw_weight: boost,
            normalized_weight: boost,
        }
    }
}

impl Compiler for RangeCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.raw_weight * self.raw_weight
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        self.normalized_weight = self.raw_weight * factor;
    }

    fn weight(&self) -> f32 {
        self.normalized_weight
    }

    /// Executes against the lexicon ordering: an OR over every term
    /// inside the bounds, scored flat.
    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        let Some(mut lexicon) = reader.lexicon(&self.query.field)? else {
            return Ok(None);
        };
        lexicon.seek(self.query.lower.as_deref().unwrap_or(""))?;
        if let Some(lower) = &self.query.lower {
            if !self.query.include_lower && lexicon.current() && lexicon.term() == lower {
                lexicon.next()?;
            }
        }

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        while lexicon.current() {
            if let Some(upper) = &self.query.upper {
                let term = lexicon.term();
                if term > upper.as_str() || (term == upper && !self.query.include_upper) {
                    break;
                }
            }
            let plist = reader.postings_for_info(&self.query.field, lexicon.term_info())?;
            matchers.push(Box::new(TermMatcher::new(
                plist,
                self.normalized_weight,
                Arc::clone(&self.sim),
            )));
            lexicon.next()?;
        }

        match matchers.len() {
            0 => Ok(None),
            1 => Ok(Some(Box::new(ConstScoreMatcher::new(
                matchers.pop().expect("one matcher"),
                self.normalized_weight,
            )))),
            _ => Ok(Some(Box::new(ConstScoreMatcher::new(
                Box::new(OrMatcher::new(matchers, Arc::clone(&self.sim))),
                self.normalized_weight,
            )))),
        }
    }
}

struct ReqOptCompiler {
    required: Box<dyn Compiler>,
    optional: Box<dyn Compiler>,
}

impl Compiler for ReqOptCompiler {
    fn sum_of_squared_weights(&self) -> f32 {
        self.required.sum_of_squared_weights() + self.optional.sum_of_squared_weights()
    }

    fn apply_norm_factor(&mut self, factor: f32) {
        self.required.apply_norm_factor(factor);
        self.optional.apply_norm_factor(factor);
    }

    fn weight(&self) -> f32 {
        self.required.weight() + self.optional.weight()
    }

    fn make_matcher(&self, reader: &SegReader) -> Result<Option<Box<dyn Matcher>>> {
        let Some(required) = self.required.make_matcher(reader)? else {
            return Ok(None);
        };
        let optional = self.optional.make_matcher(reader)?;
        Ok(Some(Box::new(ReqOptMatcher::new(required, optional))))
    }
}
