//! Block - fixed-size span of region memory divided into lines
//!
//! Each block keeps two line maps:
//!
//! ```text
//! marks: lines holding an object marked in the current trace
//! used:  lines the bump allocator must skip (baseline from the last sweep
//!        plus everything allocated since)
//! ```
//!
//! A hole is a contiguous run of lines that are not `used`. Sweeping copies
//! `marks` into `used`, which turns every unmarked line into hole space.

use crate::config::{BLOCK_SIZE, LINES_PER_BLOCK, LINE_SIZE};
use crate::object::Address;

/// Allocation status of a block after the last sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// No live lines
    Free,
    /// Some live lines, at least one hole
    Recyclable,
    /// Every line is live
    Unavailable,
}

/// A single Immix block
#[derive(Debug, Clone)]
pub struct Block {
    address: Address,
    status: BlockStatus,
    marks: Vec<bool>,
    used: Vec<bool>,
    holes: usize,
    objects: usize,
    object_bytes: usize,
}

impl Block {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            status: BlockStatus::Free,
            marks: vec![false; LINES_PER_BLOCK],
            used: vec![false; LINES_PER_BLOCK],
            holes: 1,
            objects: 0,
            object_bytes: 0,
        }
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.address.offset(BLOCK_SIZE)
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.address && addr < self.end()
    }

    #[inline]
    pub fn status(&self) -> BlockStatus {
        self.status
    }

    /// Number of holes counted at the last sweep
    #[inline]
    pub fn holes(&self) -> usize {
        self.holes
    }

    /// Objects marked live in this block
    #[inline]
    pub fn objects(&self) -> usize {
        self.objects
    }

    /// Bytes of objects marked live in this block
    #[inline]
    pub fn object_bytes(&self) -> usize {
        self.object_bytes
    }

    /// Fraction of the block occupied by live objects
    pub fn occupancy(&self) -> f64 {
        self.object_bytes as f64 / BLOCK_SIZE as f64
    }

    /// Line index of an address inside this block
    ///
    /// The block end maps to `LINES_PER_BLOCK`.
    #[inline]
    pub fn line_of(&self, addr: Address) -> usize {
        addr.offset_from(self.address) / LINE_SIZE
    }

    #[inline]
    pub fn line_address(&self, line: usize) -> Address {
        self.address.offset(line * LINE_SIZE)
    }

    fn line_span(&self, addr: Address, size: usize) -> std::ops::Range<usize> {
        let first = self.line_of(addr);
        let last = (addr.offset_from(self.address) + size.max(1) - 1) / LINE_SIZE;
        first..(last + 1).min(LINES_PER_BLOCK)
    }

    /// Record a live object: mark its lines and count it
    pub fn mark_object(&mut self, addr: Address, size: usize) {
        for line in self.line_span(addr, size) {
            self.marks[line] = true;
        }
        self.objects += 1;
        self.object_bytes += size;
    }

    /// Record freshly allocated space so the allocator won't hand it out again
    pub fn mark_used(&mut self, addr: Address, size: usize) {
        for line in self.line_span(addr, size) {
            self.used[line] = true;
        }
    }

    pub fn is_line_marked(&self, line: usize) -> bool {
        self.marks[line]
    }

    /// Whether an address falls on a line holding (or reserved for) an object
    pub fn line_in_use(&self, addr: Address) -> bool {
        if !self.contains(addr) {
            return false;
        }
        let line = self.line_of(addr);
        self.used[line] || self.marks[line]
    }

    /// Forget the previous trace
    pub fn clear_marks(&mut self) {
        self.marks.iter_mut().for_each(|m| *m = false);
        self.objects = 0;
        self.object_bytes = 0;
    }

    /// Make the current marks the allocation baseline
    pub fn copy_marks(&mut self) {
        self.used.copy_from_slice(&self.marks);
    }

    /// Recount holes and recompute status from the allocation baseline
    pub fn update_stats(&mut self) {
        self.holes = self.count_holes();

        let used = self.used.iter().filter(|&&u| u).count();
        self.status = if used == 0 {
            BlockStatus::Free
        } else if used == LINES_PER_BLOCK {
            BlockStatus::Unavailable
        } else {
            BlockStatus::Recyclable
        };
    }

    /// Find the next hole starting at or after `start_line`
    ///
    /// Returns `(first_line, line_count)`.
    pub fn find_hole(&self, start_line: usize) -> Option<(usize, usize)> {
        let mut i = start_line;
        while i < LINES_PER_BLOCK && self.used[i] {
            i += 1;
        }
        if i >= LINES_PER_BLOCK {
            return None;
        }

        let hole_start = i;
        while i < LINES_PER_BLOCK && !self.used[i] {
            i += 1;
        }

        Some((hole_start, i - hole_start))
    }

    fn count_holes(&self) -> usize {
        let mut count = 0;
        let mut in_hole = false;
        for &used in &self.used {
            if !used {
                if !in_hole {
                    count += 1;
                    in_hole = true;
                }
            } else {
                in_hole = false;
            }
        }
        count
    }
}
