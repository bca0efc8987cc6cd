//! Bounded cache of fixed-size disk blocks. Blocks live in a flat
//! arena addressed by stable indices; an ordered map keyed by blockid
//! gives O(log n) lookup. On capacity pressure the block with the
//! smallest touch count is evicted, except block slot 0 which stays
//! resident.

use std::collections::BTreeMap;

use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct Block {
    pub blockid: u64,
    pub touch: u64,
    /// Valid bytes in the block's buffer.
    pub bytecount: usize,
}

#[derive(Debug)]
pub struct BlockManager {
    blocksize: usize,
    maxblocks: usize,
    blocks: Vec<Block>,
    data: Vec<u8>,
    index: BTreeMap<u64, usize>,
}

impl BlockManager {
    pub fn new(blocksize: usize, maxblocks: usize) -> Self {
        BlockManager {
            blocksize: blocksize.max(1),
            maxblocks: maxblocks.max(2),
            blocks: Vec::new(),
            data: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn reset(&mut self) {
        self.blocks.clear();
        self.index.clear();
    }

    /// Look a block up by id, bumping its touch count.
    pub fn find(&mut self, blockid: u64) -> Option<usize> {
        let slot = self.index.get(&blockid).copied()?;
        self.blocks[slot].touch += 1;
        Some(slot)
    }

    /// Allocate a fresh slot, evicting the least-touched block when the
    /// cache is full. The returned slot is uninitialized and not yet in
    /// the index.
    pub fn create_block(&mut self) -> usize {
        if self.blocks.len() < self.maxblocks {
            self.blocks.push(Block::default());
            self.data.resize(self.blocks.len() * self.blocksize, 0);
            return self.blocks.len() - 1;
        }
        // block 0 is cold-reserved and never evicted
        let victim = self
            .blocks
            .iter()
            .enumerate()
            .skip(1)
            .min_by_key(|(_, b)| b.touch)
            .map(|(i, _)| i)
            .unwrap_or(1);
        trace!(blockid = self.blocks[victim].blockid, "evicting block");
        self.remove(victim);
        self.blocks[victim] = Block::default();
        victim
    }

    /// Register `slot` under its blockid. Inserting a duplicate id is a
    /// caller mistake; the existing block's touch is bumped instead.
    pub fn insert(&mut self, slot: usize) -> bool {
        let id = self.blocks[slot].blockid;
        if let Some(&existing) = self.index.get(&id) {
            self.blocks[existing].touch += 1;
            return false;
        }
        self.index.insert(id, slot);
        true
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        let id = self.blocks[slot].blockid;
        matches!(self.index.remove(&id), Some(s) if s == slot)
    }

    pub fn block(&self, slot: usize) -> &Block {
        &self.blocks[slot]
    }

    pub fn block_mut(&mut self, slot: usize) -> &mut Block {
        &mut self.blocks[slot]
    }

    pub fn buffer(&self, slot: usize) -> &[u8] {
        let start = slot * self.blocksize;
        &self.data[start..start + self.blocksize]
    }

    pub fn buffer_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.blocksize;
        &mut self.data[start..start + self.blocksize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(bm: &mut BlockManager, blockid: u64) -> usize {
        let slot = bm.create_block();
        bm.block_mut(slot).blockid = blockid;
        bm.block_mut(slot).touch = 1;
        bm.block_mut(slot).bytecount = bm.blocksize();
        bm.insert(slot);
        slot
    }

    #[test]
    fn find_bumps_touch() {
        let mut bm = BlockManager::new(16, 4);
        let slot = fill(&mut bm, 7);
        assert_eq!(bm.find(7), Some(slot));
        assert_eq!(bm.block(slot).touch, 2);
        assert_eq!(bm.find(8), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut bm = BlockManager::new(16, 4);
        let first = fill(&mut bm, 7);
        let second = bm.create_block();
        bm.block_mut(second).blockid = 7;
        assert!(!bm.insert(second));
        // the existing entry got the touch bump
        assert_eq!(bm.block(first).touch, 2);
    }

    #[test]
    fn eviction_takes_least_touched_but_never_slot_zero() {
        let mut bm = BlockManager::new(16, 3);
        fill(&mut bm, 0);
        let b1 = fill(&mut bm, 1);
        let b2 = fill(&mut bm, 2);
        // make slot 1 the coldest, slot 0 colder still should not matter
        bm.block_mut(b2).touch = 10;
        bm.block_mut(0).touch = 0;

        let slot = bm.create_block();
        assert_eq!(slot, b1);
        assert!(bm.find(1).is_none());
        assert!(bm.find(0).is_some());
        assert!(bm.find(2).is_some());
    }

    #[test]
    fn buffers_are_per_slot() {
        let mut bm = BlockManager::new(4, 4);
        let a = fill(&mut bm, 1);
        let b = fill(&mut bm, 2);
        bm.buffer_mut(a).copy_from_slice(b"aaaa");
        bm.buffer_mut(b).copy_from_slice(b"bbbb");
        assert_eq!(bm.buffer(a), b"aaaa");
        assert_eq!(bm.buffer(b), b"bbbb");
    }
}
