use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::posting_reader::SegPostingList;
use crate::index::similarity::Similarity;
use crate::search::matcher::Matcher;

/// Matches docs where the phrase's terms appear at consecutive positions:
/// N posting lists advanced in lock-step, then verified to hold positions
/// forming a unit-step arithmetic progression. The phrase frequency feeds
/// the same formula a term's tf does.
pub struct PhraseMatcher {
    plists: Vec<SegPostingList>,
    weight: f32,
    sim: Arc<Similarity>,
    doc_id: DocId,
    phrase_freq: u32,
    exhausted: bool,
}

impl PhraseMatcher {
    pub fn new(plists: Vec<SegPostingList>, weight: f32, sim: Arc<Similarity>) -> Self {
        debug_assert!(plists.len() >= 2);
        PhraseMatcher {
            plists,
            weight,
            sim,
            doc_id: 0,
            phrase_freq: 0,
            exhausted: false,
        }
    }

    /// Align all posting lists on a common doc at or past `candidate`.
    fn align(&mut self, mut candidate: DocId) -> Result<Option<DocId>> {
        'outer: loop {
            for tick in 1..self.plists.len() {
                let advanced = match self.plists[tick].advance(candidate)? {
                    None => {
                        self.exhausted = true;
                        return Ok(None);
                    }
                    Some(doc_id) => doc_id,
                };
                if advanced > candidate {
                    match self.plists[0].advance(advanced)? {
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
            }
            return Ok(Some(candidate));
        }
    }

    /// Anchor positions in the first list that extend through every
    /// subsequent list with unit steps.
    fn count_phrase_freq(&self) -> u32 {
        let mut freq = 0u32;
        for anchor in self.plists[0].positions() {
            let mut found = true;
            for (tick, plist) in self.plists.iter().enumerate().skip(1) {
                let wanted = anchor.pos + tick as u32;
                if plist
                    .positions()
                    .binary_search_by_key(&wanted, |p| p.pos)
                    .is_err()
                {
                    found = false;
                    break;
                }
            }
            if found {
                freq += 1;
            }
        }
        freq
    }

    fn search_from(&mut self, mut candidate: Option<DocId>) -> Result<Option<DocId>> {
        loop {
            let Some(aligned) = candidate else {
                self.exhausted = true;
                return Ok(None);
            };
            match self.align(aligned)? {
                None => return Ok(None),
                Some(doc_id) => {
                    let freq = self.count_phrase_freq();
                    if freq > 0 {
                        self.doc_id = doc_id;
                        self.phrase_freq = freq;
                        return Ok(Some(doc_id));
                    }
                    candidate = self.plists[0].next()?;
                }
            }
        }
    }
}

impl Matcher for PhraseMatcher {
    fn next(&mut self) -> Result<Option<DocId>> {
        if self.exhausted {
            return Ok(None);
        }
        let candidate = self.plists[0].next()?;
        self.search_from(candidate)
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.doc_id >= target && self.doc_id != 0 {
            return Ok(Some(self.doc_id));
        }
        if self.exhausted {
            return Ok(None);
        }
        let candidate = self.plists[0].advance(target)?;
        self.search_from(candidate)
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn score(&self) -> f32 {
        self.sim.tf(self.phrase_freq as f32)
            * self.weight
            * self.sim.decode_norm(self.plists[0].norm_byte())
    }
}
