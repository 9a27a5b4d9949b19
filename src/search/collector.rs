use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::types::DocId;

/// One scored hit. Doc ids here are index-wide: segment base plus local
/// id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDoc {
    pub doc_id: DocId,
    pub score: f32,
}

impl Eq for MatchDoc {}

impl Ord for MatchDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        // Heap order: worse scores first, so the heap root is the hit to
        // evict. Ties favor the higher doc id for eviction.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.doc_id.cmp(&self.doc_id))
            .reverse()
    }
}

impl PartialOrd for MatchDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Receives `(doc_id, score)` callbacks during matching.
pub trait HitCollector {
    fn collect(&mut self, doc_id: DocId, score: f32);
}

/// Bounded top-N collector: a min-heap of `offset + num_wanted` hits,
/// O(log k) insertion, sorted descending on the way out.
pub struct SortCollector {
    capacity: usize,
    heap: BinaryHeap<MatchDoc>,
    total_hits: u64,
}

impl SortCollector {
    pub fn new(capacity: usize) -> Self {
        SortCollector {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
            total_hits: 0,
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// Hits ordered best-first: score descending, doc id ascending on
    /// ties.
    pub fn pop_all(self) -> Vec<MatchDoc> {
        let mut hits = self.heap.into_vec();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits
    }
}

impl HitCollector for SortCollector {
    fn collect(&mut self, doc_id: DocId, score: f32) {
        self.total_hits += 1;
        if self.capacity == 0 {
            return;
        }
        let hit = MatchDoc { doc_id, score };
        if self.heap.len() < self.capacity {
            self.heap.push(hit);
        } else if let Some(&worst) = self.heap.peek() {
            if hit.cmp(&worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(hit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_best_k() {
        let mut collector = SortCollector::new(3);
        for (doc_id, score) in [(1u32, 0.2f32), (2, 0.9), (3, 0.1), (4, 0.5), (5, 0.7)] {
            collector.collect(doc_id, score);
        }
        assert_eq!(collector.total_hits(), 5);

        let hits = collector.pop_all();
        let doc_ids: Vec<DocId> = hits.iter().map(|hit| hit.doc_id).collect();
        assert_eq!(doc_ids, vec![2, 5, 4]);
    }

    #[test]
    fn ties_break_by_doc_id_ascending() {
        let mut collector = SortCollector::new(2);
        for doc_id in [9u32, 3, 6] {
            collector.collect(doc_id, 1.0);
        }
        let hits = collector.pop_all();
        let doc_ids: Vec<DocId> = hits.iter().map(|hit| hit.doc_id).collect();
        assert_eq!(doc_ids, vec![3, 6]);
    }

    #[test]
    fn zero_capacity_only_counts() {
        let mut collector = SortCollector::new(0);
        collector.collect(1, 1.0);
        collector.collect(2, 2.0);
        assert_eq!(collector.total_hits(), 2);
        assert!(collector.pop_all().is_empty());
    }
}
