use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::similarity::Similarity;
use crate::search::matcher::Matcher;

/// Disjunction: a min-heap over sub-matchers keyed by their pending doc
/// id. Score is the sum of the matching children's scores times the
/// coordination factor `overlap / max_overlap`.
pub struct OrMatcher {
    children: Vec<Box<dyn Matcher>>,
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    primed: bool,
    doc_id: DocId,
    score: f32,
    sim: Arc<Similarity>,
}

impl OrMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>, sim: Arc<Similarity>) -> Self {
        OrMatcher {
            heap: BinaryHeap::with_capacity(children.len()),
            children,
            primed: false,
            doc_id: 0,
            score: 0.0,
            sim,
        }
    }

    fn prime(&mut self) -> Result<()> {
        for (tick, child) in self.children.iter_mut().enumerate() {
            if let Some(doc_id) = child.next()? {
                self.heap.push(Reverse((doc_id, tick)));
            }
        }
        self.primed = true;
        Ok(())
    }
}

impl Matcher for OrMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        if !self.primed {
            self.prime()?;
        }
        let Some(&Reverse((doc_id, _))) = self.heap.peek() else {
            self.doc_id = 0;
            return Ok(None);
        };

        // Pop every child sitting on this doc, scoring before re-advance.
        let mut matched = Vec::new();
        let mut score_sum = 0.0f32;
        while let Some(&Reverse((top_doc, tick))) = self.heap.peek() {
            if top_doc != doc_id {
                break;
            }
            self.heap.pop();
            score_sum += self.children[tick].score();
            matched.push(tick);
        }
        for tick in matched.iter().copied() {
            if let Some(next_doc) = self.children[tick].next()? {
                self.heap.push(Reverse((next_doc, tick)));
            }
        }

        self.doc_id = doc_id;
        self.score =
            score_sum * self.sim.coord(matched.len() as u32, self.children.len() as u32);
        Ok(Some(doc_id))
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.doc_id >= target && self.doc_id != 0 {
            return Ok(Some(self.doc_id));
        }
        if !self.primed {
            self.prime()?;
        }
        // Re-seat children whose pending doc falls short of the target.
        let mut reseated = Vec::new();
        while let Some(&Reverse((doc_id, tick))) = self.heap.peek() {
            if doc_id >= target {
                break;
            }
            self.heap.pop();
            reseated.push(tick);
        }
        for tick in reseated {
            if let Some(doc_id) = self.children[tick].advance(target)? {
                self.heap.push(Reverse((doc_id, tick)));
            }
        }
        self.next()
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn score(&self) -> f32 {
        self.score
    }
}

/// Conjunction: leapfrog alignment, rarest-first when the compiler sorted
/// the children. Score is the sum of the children's contributions.
pub struct AndMatcher {
    children: Vec<Box<dyn Matcher>>,
    doc_id: DocId,
    exhausted: bool,
}

impl AndMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        AndMatcher {
            children,
            doc_id: 0,
            exhausted: false,
        }
    }

    /// Advance all children to a common doc at or past `candidate`.
    fn align(&mut self, mut candidate: DocId) -> Result<Option<DocId>> {
        'outer: loop {
            for tick in 1..self.children.len() {
                match self.children[tick].advance(candidate)? {
                    None => {
                        self.exhausted = true;
                        return Ok(None);
                    }
                    Some(doc_id) if doc_id > candidate => {
                        match self.children[0].advance(doc_id)? {
                            None => {
                                self.exhausted = true;
                                return Ok(None);
                            }
                            Some(leader) => {
                                candidate = leader;
                                continue 'outer;
                            }
                        }
                    }
                    Some(_) => {}
                }
            }
            self.doc_id = candidate;
            return Ok(Some(candidate));
        }
    }

    fn advance_leader(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        let leader = match target {
            Some(target) => self.children[0].advance(target)?,
            None => self.children[0].next()?,
        };
        match leader {
            None => {
                self.exhausted = true;
                Ok(None)
            }
            Some(candidate) => self.align(candidate),
        }
    }
}

impl Matcher for AndMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        if self.exhausted || self.children.is_empty() {
            return Ok(None);
        }
        self.advance_leader(None)
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.doc_id >= target && self.doc_id != 0 {
            return Ok(Some(self.doc_id));
        }
        if self.exhausted || self.children.is_empty() {
            return Ok(None);
        }
        self.advance_leader(Some(target))
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn score(&self) -> f32 {
        self.children.iter().map(|child| child.score()).sum()
    }
}

/// The required stream gates matching; the optional stream adds to the
/// score wherever it lands on the same doc.
pub struct ReqOptMatcher {
    required: Box<dyn Matcher>,
    optional: Option<Box<dyn Matcher>>,
    optional_done: bool,
}

impl ReqOptMatcher {
    pub fn new(required: Box<dyn Matcher>, optional: Option<Box<dyn Matcher>>) -> Self {
        ReqOptMatcher {
            required,
            optional,
            optional_done: false,
        }
    }

    fn align_optional(&mut self, doc_id: DocId) -> Result<()> {
        if self.optional_done {
            return Ok(());
        }
        if let Some(optional) = self.optional.as_mut() {
            if optional.doc_id() < doc_id && optional.advance(doc_id)?.is_none() {
                self.optional_done = true;
            }
        }
        Ok(())
    }
}

impl Matcher for ReqOptMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        match self.required.next()? {
            None => Ok(None),
            Some(doc_id) => {
                self.align_optional(doc_id)?;
                Ok(Some(doc_id))
            }
        }
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        match self.required.advance(target)? {
            None => Ok(None),
            Some(doc_id) => {
                self.align_optional(doc_id)?;
                Ok(Some(doc_id))
            }
        }
    }

    fn doc_id(&self) -> DocId {
        self.required.doc_id()
    }

    fn score(&self) -> f32 {
        let mut score = self.required.score();
        if !self.optional_done {
            if let Some(optional) = &self.optional {
                if optional.doc_id() == self.required.doc_id() {
                    score += optional.score();
                }
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::matcher::tests::{drain, FixedMatcher};

    fn sim() -> Arc<Similarity> {
        Arc::new(Similarity::new())
    }

    #[test]
    fn or_unions_and_coordinates_scores() {
        let mut matcher = OrMatcher::new(
            vec![
                Box::new(FixedMatcher::new(vec![1, 3, 5], 1.0)),
                Box::new(FixedMatcher::new(vec![3, 6], 2.0)),
            ],
            sim(),
        );
        assert_eq!(matcher.next().unwrap(), Some(1));
        assert!((matcher.score() - 0.5).abs() < 1e-6);

        assert_eq!(matcher.next().unwrap(), Some(3));
        // Both children match: (1 + 2) * 2/2.
        assert!((matcher.score() - 3.0).abs() < 1e-6);

        assert_eq!(matcher.next().unwrap(), Some(5));
        assert_eq!(matcher.next().unwrap(), Some(6));
        assert_eq!(matcher.next().unwrap(), None);
    }

    #[test]
    fn or_advance_reseats_children() {
        let mut matcher = OrMatcher::new(
            vec![
                Box::new(FixedMatcher::new(vec![1, 4, 9], 1.0)),
                Box::new(FixedMatcher::new(vec![2, 8], 1.0)),
            ],
            sim(),
        );
        assert_eq!(matcher.advance(5).unwrap(), Some(8));
        assert_eq!(matcher.next().unwrap(), Some(9));
        assert_eq!(matcher.next().unwrap(), None);
    }

    #[test]
    fn and_intersects() {
        let mut matcher = AndMatcher::new(vec![
            Box::new(FixedMatcher::new(vec![1, 2, 4, 8, 9], 1.0)),
            Box::new(FixedMatcher::new(vec![2, 3, 4, 9], 2.0)),
        ]);
        assert_eq!(drain(&mut matcher), vec![2, 4, 9]);
    }

    #[test]
    fn and_scores_sum_children() {
        let mut matcher = AndMatcher::new(vec![
            Box::new(FixedMatcher::new(vec![2], 1.5)),
            Box::new(FixedMatcher::new(vec![2], 2.5)),
        ]);
        assert_eq!(matcher.next().unwrap(), Some(2));
        assert!((matcher.score() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn and_advance_jumps() {
        let mut matcher = AndMatcher::new(vec![
            Box::new(FixedMatcher::new(vec![1, 5, 10, 20], 1.0)),
            Box::new(FixedMatcher::new(vec![5, 10, 20], 1.0)),
        ]);
        assert_eq!(matcher.advance(6).unwrap(), Some(10));
        assert_eq!(matcher.next().unwrap(), Some(20));
        assert_eq!(matcher.next().unwrap(), None);
    }

    #[test]
    fn req_opt_gates_on_required_only() {
        let mut matcher = ReqOptMatcher::new(
            Box::new(FixedMatcher::new(vec![1, 3], 1.0)),
            Some(Box::new(FixedMatcher::new(vec![2, 3], 2.0))),
        );
        assert_eq!(matcher.next().unwrap(), Some(1));
        assert!((matcher.score() - 1.0).abs() < 1e-6);
        assert_eq!(matcher.next().unwrap(), Some(3));
        assert!((matcher.score() - 3.0).abs() < 1e-6);
        assert_eq!(matcher.next().unwrap(), None);
    }
}
