/// A committed segment as the merge policy sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCandidate {
    pub name: String,
    pub number: u64,
    /// Live docs, deletions already subtracted.
    pub doc_count: u64,
}

/// Decides when and which segments to fold into one.
pub trait MergePolicy: Send + Sync {
    fn should_merge(&self, segments: &[SegmentCandidate]) -> bool;

    fn select(&self, segments: &[SegmentCandidate]) -> Vec<SegmentCandidate>;
}

/// Groups segments into decimal-magnitude tiers by live doc count and
/// merges a tier once it holds `merge_factor` segments, bounded by
/// `max_merged_segment_docs`.
pub struct TieredMergePolicy {
    pub merge_factor: usize,
    pub max_merged_segment_docs: u64,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            merge_factor: 10,
            max_merged_segment_docs: 10_000_000,
        }
    }
}

impl TieredMergePolicy {
    fn tiers(&self, segments: &[SegmentCandidate]) -> Vec<Vec<SegmentCandidate>> {
        let mut tiers: Vec<Vec<SegmentCandidate>> = Vec::new();
        for segment in segments {
            if segment.doc_count > self.max_merged_segment_docs {
                continue;
            }
            let tier = (segment.doc_count.max(1) as f64).log10().floor() as usize;
            while tiers.len() <= tier {
                tiers.push(Vec::new());
            }
            tiers[tier].push(segment.clone());
        }
        tiers
    }
}

impl MergePolicy for TieredMergePolicy {
    fn should_merge(&self, segments: &[SegmentCandidate]) -> bool {
        self.tiers(segments)
            .iter()
            .any(|tier| tier.len() >= self.merge_factor)
    }

    fn select(&self, segments: &[SegmentCandidate]) -> Vec<SegmentCandidate> {
        for tier in self.tiers(segments) {
            if tier.len() < self.merge_factor {
                continue;
            }
            // Smallest first, stop before the merged result outgrows the
            // cap.
            let mut tier = tier;
            tier.sort_by_key(|segment| segment.doc_count);
            let mut selected = Vec::new();
            let mut total = 0u64;
            for segment in tier {
                if total + segment.doc_count > self.max_merged_segment_docs {
                    break;
                }
                total += segment.doc_count;
                selected.push(segment);
            }
            if selected.len() >= 2 {
                return selected;
            }
        }
        Vec::new()
    }
}

/// Fold everything into one segment on every commit; handy in tests.
pub struct AlwaysMergePolicy;

impl MergePolicy for AlwaysMergePolicy {
    fn should_merge(&self, segments: &[SegmentCandidate]) -> bool {
        segments.len() >= 2
    }

    fn select(&self, segments: &[SegmentCandidate]) -> Vec<SegmentCandidate> {
        if segments.len() >= 2 {
            segments.to_vec()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(number: u64, doc_count: u64) -> SegmentCandidate {
        SegmentCandidate {
            name: format!("seg_{}", number),
            number,
            doc_count,
        }
    }

    #[test]
    fn tier_fills_before_merge_triggers() {
        let policy = TieredMergePolicy {
            merge_factor: 3,
            max_merged_segment_docs: 1000,
        };
        let mut segments = vec![candidate(1, 5), candidate(2, 7)];
        assert!(!policy.should_merge(&segments));

        segments.push(candidate(3, 3));
        assert!(policy.should_merge(&segments));

        let selected = policy.select(&segments);
        assert_eq!(selected.len(), 3);
        // Smallest first.
        assert_eq!(selected[0].doc_count, 3);
    }

    #[test]
    fn distinct_tiers_do_not_combine() {
        let policy = TieredMergePolicy {
            merge_factor: 3,
            max_merged_segment_docs: 1000,
        };
        let segments = vec![candidate(1, 5), candidate(2, 50), candidate(3, 500)];
        assert!(!policy.should_merge(&segments));
        assert!(policy.select(&segments).is_empty());
    }

    #[test]
    fn oversized_segments_are_left_alone() {
        let policy = TieredMergePolicy {
            merge_factor: 2,
            max_merged_segment_docs: 100,
        };
        let segments = vec![candidate(1, 5000), candidate(2, 6000)];
        assert!(!policy.should_merge(&segments));
    }
}
