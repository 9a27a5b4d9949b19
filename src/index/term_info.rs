/// Per-term entry in the lexicon: document frequency plus the file offsets
/// where the term's posting records and skip entries begin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermInfo {
    pub doc_freq: u32,
    pub post_offset: u64,
    pub skip_offset: u64,
}

impl TermInfo {
    pub fn new(doc_freq: u32, post_offset: u64, skip_offset: u64) -> Self {
        TermInfo {
            doc_freq,
            post_offset,
            skip_offset,
        }
    }
}
