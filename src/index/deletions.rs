use std::collections::BTreeMap;

use roaring::RoaringBitmap;

use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::index::segment::Segment;
use crate::store::folder::Folder;
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;
use crate::util::base36::from_base36;

/// Plain bit vector, one bit per doc id. Bit 0 is unused since doc ids
/// start at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    capacity: u32,
    bits: Vec<u8>,
}

impl BitVector {
    pub fn with_capacity(capacity: u32) -> Self {
        BitVector {
            capacity,
            bits: vec![0u8; (capacity as usize + 8) / 8],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn set(&mut self, tick: u32) {
        debug_assert!(tick <= self.capacity);
        self.bits[(tick / 8) as usize] |= 1 << (tick % 8);
    }

    pub fn get(&self, tick: u32) -> bool {
        if tick > self.capacity {
            return false;
        }
        self.bits[(tick / 8) as usize] & (1 << (tick % 8)) != 0
    }

    pub fn count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    pub fn write(&self, out: &mut OutStream) -> Result<()> {
        out.write_c32(self.capacity)?;
        out.write_c32(self.bits.len() as u32)?;
        out.write_bytes(&self.bits)
    }

    pub fn read(stream: &mut InStream) -> Result<Self> {
        let capacity = stream.read_c32()?;
        let len = stream.read_c32()? as usize;
        let mut bits = vec![0u8; len];
        stream.read_bytes(&mut bits)?;
        if len < (capacity as usize + 8) / 8 {
            return Err(Error::corrupt("Bit vector shorter than its capacity"));
        }
        Ok(BitVector { capacity, bits })
    }
}

/// Accumulates deletions against existing segments during a write session;
/// flushed as one `deletions-<snapshot>.bv` tombstone file per touched
/// segment at commit.
#[derive(Debug, Default)]
pub struct DeletionsWriter {
    updates: BTreeMap<String, RoaringBitmap>,
}

impl DeletionsWriter {
    pub fn new() -> Self {
        DeletionsWriter::default()
    }

    pub fn delete_doc(&mut self, seg_name: &str, local_doc: DocId) {
        self.updates
            .entry(seg_name.to_string())
            .or_default()
            .insert(local_doc);
    }

    pub fn has_deletions(&self) -> bool {
        self.updates.values().any(|b| !b.is_empty())
    }

    pub fn pending(&self, seg_name: &str) -> Option<&RoaringBitmap> {
        self.updates.get(seg_name).filter(|b| !b.is_empty())
    }

    pub fn pending_count(&self, seg_name: &str) -> u64 {
        self.pending(seg_name).map(|b| b.len()).unwrap_or(0)
    }

    /// Forget pending deletions for a segment that is being merged away;
    /// the merge's doc map already consumed them.
    pub fn forget(&mut self, seg_name: &str) {
        self.updates.remove(seg_name);
    }

    pub fn segments_touched(&self) -> impl Iterator<Item = &str> {
        self.updates.keys().map(String::as_str)
    }

    /// Write one tombstone file per touched segment, folding in that
    /// segment's pre-existing deletions, and return the paths written.
    pub fn finish(
        &mut self,
        folder: &dyn Folder,
        snapshot_name: &str,
        existing: &BTreeMap<String, (DocId, Option<BitVector>)>,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for (seg_name, new_deletions) in &self.updates {
            if new_deletions.is_empty() {
                continue;
            }
            let (doc_max, old) = existing
                .get(seg_name)
                .ok_or_else(|| Error::internal(format!("No reader for '{}'", seg_name)))?;

            let mut bit_vec = old
                .clone()
                .unwrap_or_else(|| BitVector::with_capacity(*doc_max));
            for doc in new_deletions {
                bit_vec.set(doc);
            }

            let path = format!("{}/deletions-{}.bv", seg_name, snapshot_name);
            let mut out = folder.open_out(&path)?;
            bit_vec.write(&mut out)?;
            out.close()?;
            written.push(path);
        }
        self.updates.clear();
        Ok(written)
    }
}

/// Locate and load a segment's live tombstone file: the one named by the
/// highest-numbered snapshot among the entries handed to us.
pub struct DeletionsReader;

impl DeletionsReader {
    pub fn load(
        index_folder: &dyn Folder,
        seg_name: &str,
        entries: &[String],
    ) -> Result<Option<BitVector>> {
        let prefix = format!("{}/deletions-", seg_name);
        let mut best: Option<(u64, &str)> = None;
        for entry in entries {
            let Some(rest) = entry.strip_prefix(&prefix) else {
                continue;
            };
            let Some(stem) = rest.strip_suffix(".bv") else {
                continue;
            };
            // Tombstones are named deletions-snapshot_<b36>.bv.
            let Some(number) = stem
                .strip_prefix("snapshot_")
                .and_then(|b36| from_base36(b36).ok())
            else {
                continue;
            };
            if best.map(|(n, _)| number > n).unwrap_or(true) {
                best = Some((number, entry));
            }
        }
        match best {
            None => Ok(None),
            Some((_, path)) => {
                let mut stream = index_folder.open_in(path)?;
                BitVector::read(&mut stream).map(Some)
            }
        }
    }
}
