/// Codec intervals and packing policy shared by a segment's writers and
/// readers. These are frozen into the on-disk format; readers use the
/// values recorded in segment metadata, not the local defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
    /// Every Nth lexicon term gets a key frame in the `.ix` stream.
    pub index_interval: u32,
    /// Every Nth posting within a term gets a skip-list entry.
    pub skip_interval: u32,
    /// Pack finished segments into compound files.
    pub use_compound_files: bool,
}

impl Default for Architecture {
    fn default() -> Self {
        Architecture {
            index_interval: 128,
            skip_interval: 16,
            use_compound_files: true,
        }
    }
}

impl Architecture {
    pub fn plain_files() -> Self {
        Architecture {
            use_compound_files: false,
            ..Architecture::default()
        }
    }
}
