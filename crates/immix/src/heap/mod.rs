//! Heap Module - Block/Region Allocator
//!
//! Owns the region: chunks of fixed-size blocks laid out in a private
//! address range starting at [`REGION_BASE`]. Hands out bump-allocated
//! space from holes, grows by appending chunks, and after each sweep is
//! restarted to prefer sparsely occupied blocks.
//!
//! ```text
//! chunk 0                      chunk 1
//! ┌──────┬──────┬──────┐       ┌──────┬──────┬──────┐
//! │block0│block1│ ...  │       │block0│block1│ ...  │
//! └──────┴──────┴──────┘       └──────┴──────┴──────┘
//!    │ lines: ██░░░██░░░░  (░ = hole)
//! ```
//!
//! Block order for bump allocation (recomputed by `restart`):
//! 1. recyclable blocks at or below the overall occupancy, sparsest first
//! 2. free blocks
//! 3. denser recyclable blocks, only while free space is scarce
//!
//! Filling sparse blocks first packs fragmented survivors together over
//! several cycles instead of relocating everything at once.

pub mod block;
pub mod chunk;

pub use block::{Block, BlockStatus};
pub use chunk::Chunk;

use crate::config::{ImmixConfig, BLOCK_SIZE, OBJECT_ALIGNMENT, REGION_BASE};
use crate::object::Address;
use crate::util::Alignment;
use std::collections::VecDeque;

/// Position of a block: chunk index and block index inside the chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    pub chunk: usize,
    pub block: usize,
}

/// Result of a raw block allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAllocation {
    /// Allocated address, null when the request can never fit a block
    pub address: Address,
    /// Chunks appended while satisfying this request
    pub chunks_added: usize,
    /// Growth crossed the collection threshold
    pub collect_now: bool,
}

/// BlockAllocator - owner of every chunk and block of the region
pub struct BlockAllocator {
    chunks: Vec<Chunk>,
    blocks_per_chunk: usize,
    chunk_bytes: usize,
    collection_threshold: usize,
    next_base: Address,

    // Bump cursor inside the current hole
    current: Option<BlockId>,
    cursor: Address,
    limit: Address,

    // Blocks to bump into, in preference order
    candidates: VecDeque<BlockId>,
}

impl BlockAllocator {
    pub fn new(config: &ImmixConfig) -> Self {
        Self {
            chunks: Vec::new(),
            blocks_per_chunk: config.blocks_per_chunk,
            chunk_bytes: config.chunk_bytes(),
            collection_threshold: config.chunk_collection_threshold,
            next_base: REGION_BASE,
            current: None,
            cursor: Address::null(),
            limit: Address::null(),
            candidates: VecDeque::new(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Iterate every block of every chunk
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.chunks.iter().flat_map(|chunk| chunk.blocks().iter())
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.chunks
            .iter_mut()
            .flat_map(|chunk| chunk.blocks_mut().iter_mut())
    }

    /// Total bytes covered by all chunks
    pub fn total_bytes(&self) -> usize {
        self.blocks().count() * BLOCK_SIZE
    }

    /// Locate the block containing `addr`
    pub fn block_id(&self, addr: Address) -> Option<BlockId> {
        self.chunks.iter().enumerate().find_map(|(chunk, c)| {
            c.block_index(addr).map(|block| BlockId { chunk, block })
        })
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.chunks[id.chunk].block(id.block)
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.chunks[id.chunk].block_mut(id.block)
    }

    pub fn block_for(&self, addr: Address) -> Option<&Block> {
        self.block_id(addr).map(|id| self.block(id))
    }

    pub fn block_for_mut(&mut self, addr: Address) -> Option<&mut Block> {
        self.block_id(addr).map(move |id| self.block_mut(id))
    }

    /// Bump-allocate `size` bytes
    ///
    /// Moves through holes of the current block, then to the next candidate
    /// block, and appends a chunk when no candidate is left. Growth past the
    /// collection threshold sets `collect_now`, but the allocation itself
    /// always succeeds for sizes a block can hold.
    pub fn allocate(&mut self, size: usize) -> BlockAllocation {
        let size = Alignment::align_up(size.max(OBJECT_ALIGNMENT), OBJECT_ALIGNMENT);
        let mut result = BlockAllocation {
            address: Address::null(),
            chunks_added: 0,
            collect_now: false,
        };

        if size > BLOCK_SIZE {
            return result;
        }

        loop {
            if let Some(id) = self.current {
                if self.cursor.offset(size) <= self.limit {
                    let address = self.cursor;
                    self.cursor = self.cursor.offset(size);
                    self.block_mut(id).mark_used(address, size);
                    result.address = address;
                    return result;
                }

                let block = self.block(id);
                let next_line = block.line_of(self.limit);
                let hole = block
                    .find_hole(next_line)
                    .map(|(start, len)| (block.line_address(start), block.line_address(start + len)));
                if let Some((cursor, limit)) = hole {
                    self.cursor = cursor;
                    self.limit = limit;
                    continue;
                }
            }

            match self.candidates.pop_front() {
                Some(id) => {
                    let start = self.block(id).address();
                    self.current = Some(id);
                    self.cursor = start;
                    self.limit = start;
                }
                None => {
                    self.add_chunk();
                    result.chunks_added += 1;
                    if self.chunks.len() > self.collection_threshold {
                        result.collect_now = true;
                    }
                }
            }
        }
    }

    /// Append a chunk and queue its blocks for allocation
    pub fn add_chunk(&mut self) -> usize {
        let chunk = Chunk::new(self.next_base, self.blocks_per_chunk);
        self.next_base = chunk.end();

        let index = self.chunks.len();
        self.chunks.push(chunk);
        for block in 0..self.blocks_per_chunk {
            self.candidates.push_back(BlockId {
                chunk: index,
                block,
            });
        }

        log::debug!(
            "immix: added chunk {} ({} blocks), {} chunks total",
            index,
            self.blocks_per_chunk,
            self.chunks.len()
        );

        self.chunks.len()
    }

    /// Recalibrate which blocks are bump-allocation targets
    ///
    /// Called once per cycle after sweeping with the overall occupancy
    /// ratio and the number of free bytes left in the region.
    pub fn restart(&mut self, occupancy: f64, free_bytes: usize) {
        self.current = None;
        self.cursor = Address::null();
        self.limit = Address::null();
        self.candidates.clear();

        let mut sparse = Vec::new();
        let mut dense = Vec::new();
        let mut free = Vec::new();

        for (chunk, c) in self.chunks.iter().enumerate() {
            for (block, b) in c.blocks().iter().enumerate() {
                let id = BlockId { chunk, block };
                match b.status() {
                    BlockStatus::Free => free.push(id),
                    BlockStatus::Recyclable if b.occupancy() <= occupancy => {
                        sparse.push((b.occupancy(), id))
                    }
                    BlockStatus::Recyclable => dense.push((b.occupancy(), id)),
                    BlockStatus::Unavailable => {}
                }
            }
        }

        sparse.sort_by(|a, b| a.0.total_cmp(&b.0));
        dense.sort_by(|a, b| a.0.total_cmp(&b.0));

        self.candidates.extend(sparse.iter().map(|(_, id)| *id));
        self.candidates.extend(free.iter().copied());

        // Dense blocks only absorb allocation once free space runs low.
        let held_back = if free_bytes < self.chunk_bytes {
            self.candidates.extend(dense.iter().map(|(_, id)| *id));
            0
        } else {
            dense.len()
        };

        log::debug!(
            "immix: restart at {:.1}% occupancy, {} bytes free: {} sparse, {} free, {} dense held back",
            occupancy * 100.0,
            free_bytes,
            sparse.len(),
            free.len(),
            held_back
        );
    }

    /// Number of queued allocation targets
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}
