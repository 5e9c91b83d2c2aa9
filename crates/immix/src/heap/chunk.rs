//! Chunk - contiguous group of blocks
//!
//! Chunks are appended as the region grows and never released; space is
//! recovered by sweeping their blocks.

use super::block::Block;
use crate::config::BLOCK_SIZE;
use crate::object::Address;

#[derive(Debug, Clone)]
pub struct Chunk {
    base: Address,
    blocks: Vec<Block>,
}

impl Chunk {
    pub fn new(base: Address, block_count: usize) -> Self {
        let blocks = (0..block_count)
            .map(|i| Block::new(base.offset(i * BLOCK_SIZE)))
            .collect();
        Self { base, blocks }
    }

    #[inline]
    pub fn base(&self) -> Address {
        self.base
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.base.offset(self.blocks.len() * BLOCK_SIZE)
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Index of the block holding `addr`, if it is inside this chunk
    pub fn block_index(&self, addr: Address) -> Option<usize> {
        if self.contains(addr) {
            Some(addr.offset_from(self.base) / BLOCK_SIZE)
        } else {
            None
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut Block {
        &mut self.blocks[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_lookup() {
        let chunk = Chunk::new(Address::new(0x100_0000), 4);
        assert_eq!(chunk.end(), Address::new(0x100_0000 + 4 * BLOCK_SIZE));
        assert_eq!(chunk.block_index(Address::new(0x100_0000)), Some(0));
        assert_eq!(
            chunk.block_index(Address::new(0x100_0000 + BLOCK_SIZE + 8)),
            Some(1)
        );
        assert_eq!(chunk.block_index(chunk.end()), None);
    }
}
