//! Allocator Module - Region Allocator Front-End
//!
//! Thin facade over the block allocator used for fresh mature allocation
//! and for copying promoted objects:
//!
//! ```text
//! allocate(bytes) -> Allocation { address, collect_now }
//! ```
//!
//! `collect_now` asks the caller to schedule a full collection before the
//! next allocation. The current allocation still succeeds, so a copy in
//! the middle of a trace is never interrupted.

use crate::config::ImmixConfig;
use crate::heap::BlockAllocator;
use crate::object::Address;

/// Result of a region allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Allocated address, null on failure
    pub address: Address,
    /// Region growth crossed the collection threshold
    pub collect_now: bool,
}

impl Allocation {
    pub fn failed() -> Self {
        Self {
            address: Address::null(),
            collect_now: false,
        }
    }
}

/// Anything that hands out region space
pub trait RegionAllocator {
    fn allocate(&mut self, bytes: usize) -> Allocation;
}

/// ImmixAllocator - the collector's allocation front-end
pub struct ImmixAllocator {
    blocks: BlockAllocator,
    max_object_size: usize,
    // Chunks appended since the owner last asked
    added_chunks: usize,
}

impl ImmixAllocator {
    pub fn new(config: &ImmixConfig) -> Self {
        Self {
            blocks: BlockAllocator::new(config),
            max_object_size: config.max_object_size,
            added_chunks: 0,
        }
    }

    pub fn blocks(&self) -> &BlockAllocator {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut BlockAllocator {
        &mut self.blocks
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    /// Number of chunks added since the last call
    pub fn take_added_chunks(&mut self) -> usize {
        std::mem::take(&mut self.added_chunks)
    }

    /// Recalibrate allocation targets after a sweep
    pub fn restart(&mut self, occupancy: f64, free_bytes: usize) {
        self.blocks.restart(occupancy, free_bytes);
    }
}

impl RegionAllocator for ImmixAllocator {
    fn allocate(&mut self, bytes: usize) -> Allocation {
        if bytes > self.max_object_size {
            return Allocation::failed();
        }

        let result = self.blocks.allocate(bytes);
        self.added_chunks += result.chunks_added;

        Allocation {
            address: result.address,
            collect_now: result.collect_now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BLOCK_SIZE, REGION_BASE};

    #[test]
    fn test_allocation_reports_growth_once() {
        let mut alloc = ImmixAllocator::new(&ImmixConfig::default());

        let first = alloc.allocate(64);
        assert_eq!(first.address, REGION_BASE);
        assert_eq!(alloc.take_added_chunks(), 1);
        assert_eq!(alloc.take_added_chunks(), 0);

        alloc.allocate(64);
        assert_eq!(alloc.take_added_chunks(), 0);
    }

    #[test]
    fn test_oversized_allocation_fails_without_growth() {
        let mut alloc = ImmixAllocator::new(&ImmixConfig::default());
        let result = alloc.allocate(BLOCK_SIZE);

        assert!(result.address.is_null());
        assert!(!result.collect_now);
        assert!(alloc.blocks().chunks().is_empty());
    }
}
