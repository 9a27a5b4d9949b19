use std::collections::BTreeMap;

use crate::analysis::Inversion;
use crate::core::types::DocId;

/// One occurrence of a term within a document: its position plus the
/// code-point offsets that highlighting needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingPosition {
    pub pos: u32,
    pub start_offset: u32,
    pub end_offset: u32,
}

/// One document's postings for one term.
#[derive(Debug, Clone, PartialEq)]
pub struct DocPosting {
    pub doc_id: DocId,
    pub freq: u32,
    pub norm_byte: u8,
    pub positions: Vec<PostingPosition>,
}

/// Per-field accumulator of raw postings. Terms are kept in a sorted map
/// so flushing walks them in ascending byte order; within a term, docs
/// arrive in ascending doc-id order by construction.
#[derive(Debug, Default)]
pub struct PostingAccumulator {
    terms: BTreeMap<String, Vec<DocPosting>>,
}

impl PostingAccumulator {
    pub fn new() -> Self {
        PostingAccumulator::default()
    }

    /// Consume an inverted token stream for one (doc, field).
    pub fn add_inversion(&mut self, doc_id: DocId, inversion: &mut Inversion, norm_byte: u8) {
        inversion.invert();
        while let Some(cluster) = inversion.next_cluster() {
            let positions: Vec<PostingPosition> = cluster
                .iter()
                .map(|token| PostingPosition {
                    pos: token.pos,
                    start_offset: token.start_offset,
                    end_offset: token.end_offset,
                })
                .collect();
            let posting = DocPosting {
                doc_id,
                freq: cluster.len() as u32,
                norm_byte,
                positions,
            };
            self.terms
                .entry(cluster[0].text.clone())
                .or_default()
                .push(posting);
        }
    }

    /// Feed a pre-built posting through, as merges do.
    pub fn add_raw(&mut self, term: &str, posting: DocPosting) {
        self.terms.entry(term.to_string()).or_default().push(posting);
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DocPosting])> {
        self.terms
            .iter()
            .map(|(term, postings)| (term.as_str(), postings.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Token;

    fn inversion_of(words: &[&str]) -> Inversion {
        let mut inv = Inversion::new();
        for (i, word) in words.iter().enumerate() {
            inv.append(Token::new(*word, i as u32 * 6, i as u32 * 6 + 5));
        }
        inv
    }

    #[test]
    fn clusters_become_postings_with_freqs() {
        let mut acc = PostingAccumulator::new();
        let mut inv = inversion_of(&["to", "be", "or", "not", "to", "be"]);
        acc.add_inversion(1, &mut inv, 124);

        let collected: Vec<(&str, &[DocPosting])> = acc.iter().collect();
        let terms: Vec<&str> = collected.iter().map(|(t, _)| *t).collect();
        assert_eq!(terms, vec!["be", "not", "or", "to"]);

        let (_, be) = collected[0];
        assert_eq!(be[0].freq, 2);
        assert_eq!(be[0].norm_byte, 124);
        let positions: Vec<u32> = be[0].positions.iter().map(|p| p.pos).collect();
        assert_eq!(positions, vec![2, 6]);
    }

    #[test]
    fn docs_accumulate_in_order() {
        let mut acc = PostingAccumulator::new();
        for doc_id in 1..=3 {
            let mut inv = inversion_of(&["word"]);
            acc.add_inversion(doc_id, &mut inv, 0);
        }
        let (_, postings) = acc.iter().next().unwrap();
        let doc_ids: Vec<DocId> = postings.iter().map(|p| p.doc_id).collect();
        assert_eq!(doc_ids, vec![1, 2, 3]);
    }
}
