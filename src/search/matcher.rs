use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::posting_reader::SegPostingList;
use crate::index::similarity::Similarity;

/// Per-segment doc-id stream with scores. Matchers compose into a tree
/// mirroring the query; leaves iterate posting lists.
pub trait Matcher {
    /// Next doc id in ascending order, or None when exhausted.
    fn next(&mut self) -> Result<Option<DocId>>;

    /// First doc id `>=` target.
    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.doc_id() >= target && self.doc_id() != 0 {
            return Ok(Some(self.doc_id()));
        }
        while let Some(doc_id) = self.next()? {
            if doc_id >= target {
                return Ok(Some(doc_id));
            }
        }
        Ok(None)
    }

    /// Current doc id; 0 before the first `next`.
    fn doc_id(&self) -> DocId;

    fn score(&self) -> f32;
}

/// Leaf matcher over one term's posting list.
/// score = tf^0.5 * weight * field_norm.
pub struct TermMatcher {
    plist: SegPostingList,
    weight: f32,
    sim: Arc<Similarity>,
}

impl TermMatcher {
    pub fn new(plist: SegPostingList, weight: f32, sim: Arc<Similarity>) -> Self {
        TermMatcher { plist, weight, sim }
    }
}

impl Matcher for TermMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        self.plist.next()
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        self.plist.advance(target)
    }

    fn doc_id(&self) -> DocId {
        self.plist.doc_id()
    }

    fn score(&self) -> f32 {
        self.sim.tf(self.plist.freq() as f32)
            * self.weight
            * self.sim.decode_norm(self.plist.norm_byte())
    }
}

/// Emits every doc in `[1, doc_max]`.
pub struct MatchAllMatcher {
    doc_max: DocId,
    doc_id: DocId,
    weight: f32,
}

impl MatchAllMatcher {
    pub fn new(doc_max: DocId, weight: f32) -> Self {
        MatchAllMatcher {
            doc_max,
            doc_id: 0,
            weight,
        }
    }
}

impl Matcher for MatchAllMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        if self.doc_id >= self.doc_max {
            return Ok(None);
        }
        self.doc_id += 1;
        Ok(Some(self.doc_id))
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if target > self.doc_max {
            self.doc_id = self.doc_max;
            return Ok(None);
        }
        self.doc_id = target.max(self.doc_id.max(1));
        Ok(Some(self.doc_id))
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn score(&self) -> f32 {
        self.weight
    }
}

/// Emits nothing.
pub struct NoMatchMatcher;

impl Matcher for NoMatchMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        Ok(None)
    }

    fn doc_id(&self) -> DocId {
        0
    }

    fn score(&self) -> f32 {
        0.0
    }
}

/// Emits all docs the child does not. Contributes no score.
pub struct NotMatcher {
    negand: Option<Box<dyn Matcher>>,
    negand_doc: Option<DocId>,
    negand_done: bool,
    doc_max: DocId,
    doc_id: DocId,
}

impl NotMatcher {
    pub fn new(negand: Option<Box<dyn Matcher>>, doc_max: DocId) -> Self {
        NotMatcher {
            negand,
            negand_doc: None,
            negand_done: false,
            doc_max,
            doc_id: 0,
        }
    }

    fn negand_blocks(&mut self, candidate: DocId) -> Result<bool> {
        if self.negand_done {
            return Ok(false);
        }
        let Some(negand) = self.negand.as_mut() else {
            return Ok(false);
        };
        loop {
            match self.negand_doc {
                Some(doc) if doc >= candidate => return Ok(doc == candidate),
                _ => match negand.advance(candidate)? {
                    Some(doc) => self.negand_doc = Some(doc),
                    None => {
                        self.negand_done = true;
                        return Ok(false);
                    }
                },
            }
        }
    }
}

impl Matcher for NotMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        loop {
            if self.doc_id >= self.doc_max {
                return Ok(None);
            }
            self.doc_id += 1;
            if !self.negand_blocks(self.doc_id)? {
                return Ok(Some(self.doc_id));
            }
        }
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.doc_id >= target && self.doc_id != 0 {
            return Ok(Some(self.doc_id));
        }
        if target > self.doc_id + 1 {
            self.doc_id = target - 1;
        }
        self.next()
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn score(&self) -> f32 {
        0.0
    }
}

/// Pins a constant score onto another matcher's doc stream; range queries
/// use this over their term union.
pub struct ConstScoreMatcher {
    inner: Box<dyn Matcher>,
    score: f32,
}

impl ConstScoreMatcher {
    pub fn new(inner: Box<dyn Matcher>, score: f32) -> Self {
        ConstScoreMatcher { inner, score }
    }
}

impl Matcher for ConstScoreMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        self.inner.next()
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        self.inner.advance(target)
    }

    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn score(&self) -> f32 {
        self.score
    }
}
