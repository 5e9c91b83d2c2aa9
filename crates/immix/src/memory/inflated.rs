//! Inflated Header Table
//!
//! Side table for per-object state that does not fit the compact header:
//! lock ownership, identity hash. An object stores only the integer index of
//! its record, never a reference, so object and record form no cycle.
//!
//! ```text
//! chunk 0               chunk 1               chunk 2
//! ┌──┬──┬──┬──┐         ┌──┬──┬──┬──┐         ┌──┬──┬──┬──┐
//! │##│  │##│  │         │  │  │  │  │         │  │  │  │  │
//! └──┴──┴──┴──┘         └──┴──┴──┴──┘         └──┴──┴──┴──┘
//!  index = chunk * chunk_size + slot           (## = live)
//! ```
//!
//! Liveness is not traced separately: a record is marked when its owner is
//! marked, and `deallocate_headers` keeps exactly the records marked under
//! the generation the collector just finished with. The freelist is rebuilt
//! after each sweep; trailing chunks with no live record are released.

use crate::config::ImmixConfig;
use crate::error::bug;
use crate::object::{Address, HeaderIndex};
use crate::stats::InflatedHeaderDiagnostics;

/// Lock state kept in an inflated header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockState {
    /// Thread currently holding the lock
    pub owner: Option<u64>,
    /// Recursion depth of the holder
    pub count: u32,
}

/// A single out-of-line header record
#[derive(Debug, Clone, Default)]
pub struct InflatedHeader {
    owner: Address,
    mark: u32,
    in_use: bool,
    identity_hash: Option<u64>,
    lock: LockState,
}

impl InflatedHeader {
    fn initialize(&mut self, owner: Address) {
        *self = Self {
            owner,
            in_use: true,
            ..Default::default()
        };
    }

    /// Return the slot to its empty state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn in_use_p(&self) -> bool {
        self.in_use
    }

    #[inline]
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Address) {
        self.owner = owner;
    }

    #[inline]
    pub fn marked_p(&self, mark: u32) -> bool {
        self.in_use && self.mark == mark
    }

    #[inline]
    pub fn mark(&mut self, mark: u32) {
        self.mark = mark;
    }

    pub fn identity_hash(&self) -> Option<u64> {
        self.identity_hash
    }

    pub fn set_identity_hash(&mut self, hash: u64) {
        self.identity_hash = Some(hash);
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn locked_p(&self) -> bool {
        self.lock.owner.is_some()
    }

    /// Acquire for `thread`, re-entrantly
    ///
    /// Returns false if another thread holds the lock.
    pub fn lock(&mut self, thread: u64) -> bool {
        match self.lock.owner {
            None => {
                self.lock = LockState {
                    owner: Some(thread),
                    count: 1,
                };
                true
            }
            Some(holder) if holder == thread => {
                self.lock.count += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Release one level held by `thread`
    ///
    /// Returns false if `thread` does not hold the lock.
    pub fn unlock(&mut self, thread: u64) -> bool {
        if self.lock.owner != Some(thread) {
            return false;
        }
        self.lock.count -= 1;
        if self.lock.count == 0 {
            self.lock.owner = None;
        }
        true
    }
}

/// Result of allocating a record
pub struct InflatedAllocation<'a> {
    pub header: &'a mut InflatedHeader,
    pub index: HeaderIndex,
    /// The table grew to satisfy this request
    pub needs_collection: bool,
}

/// InflatedHeaders - chunked arena of header records with a freelist
pub struct InflatedHeaders {
    chunks: Vec<Vec<InflatedHeader>>,
    chunk_size: usize,
    limit: u64,

    // Free indices, next one to hand out on top
    free_list: Vec<HeaderIndex>,
    in_use: usize,

    diagnostic: InflatedHeaderDiagnostics,
}

impl InflatedHeaders {
    pub fn new(config: &ImmixConfig) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: config.inflated_header_chunk_size,
            limit: config.inflated_header_limit,
            free_list: Vec::new(),
            in_use: 0,
            diagnostic: InflatedHeaderDiagnostics::default(),
        }
    }

    /// Allocate a record for `owner`
    ///
    /// Growing the table sets `needs_collection`; the allocation itself
    /// always succeeds unless the index space is exhausted, which is fatal.
    pub fn allocate(&mut self, owner: Address) -> InflatedAllocation<'_> {
        let mut needs_collection = false;

        if self.free_list.is_empty() {
            self.allocate_chunk();
            needs_collection = true;
            self.diagnostic.collections += 1;
        }

        let index = match self.free_list.pop() {
            Some(index) if (index as u64) < self.limit => index,
            _ => bug(&format!(
                "can't handle more than {} inflated headers active at the same time",
                self.limit
            )),
        };

        self.in_use += 1;
        let header = self.slot_mut(index);
        header.initialize(owner);

        InflatedAllocation {
            header,
            index,
            needs_collection,
        }
    }

    fn allocate_chunk(&mut self) {
        let first = (self.chunks.len() * self.chunk_size) as u64;
        if first >= self.limit || first > HeaderIndex::MAX as u64 {
            bug(&format!(
                "can't handle more than {} inflated headers active at the same time",
                self.limit
            ));
        }

        self.chunks
            .push(vec![InflatedHeader::default(); self.chunk_size]);

        let last = (first + self.chunk_size as u64).min(self.limit);
        self.free_list
            .extend((first..last).rev().map(|index| index as HeaderIndex));
    }

    /// Reclaim every record not marked under `mark`
    ///
    /// Must be called with the generation the collector just finished.
    pub fn deallocate_headers(&mut self, mark: u32) -> InflatedHeaderDiagnostics {
        let mut chunk_marks = vec![false; self.chunks.len()];
        let mut objects = 0;

        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            for header in chunk.iter_mut() {
                if header.marked_p(mark) {
                    chunk_marks[i] = true;
                    objects += 1;
                } else {
                    header.clear();
                }
            }
        }

        self.rebuild_freelist(&chunk_marks);

        self.diagnostic.objects = objects;
        self.diagnostic.bytes = self.in_use * std::mem::size_of::<InflatedHeader>();
        self.diagnostic.free_slots = self.free_list.len();
        self.diagnostic.clone()
    }

    /// Rebuild the freelist from the slots cleared by the last pass
    ///
    /// Trailing chunks without live records are released. Free slots of
    /// chunks that still hold live records are handed out first, each group
    /// in ascending index order.
    fn rebuild_freelist(&mut self, chunk_marks: &[bool]) {
        let keep = chunk_marks
            .iter()
            .rposition(|&marked| marked)
            .map_or(0, |last| last + 1);
        self.chunks.truncate(keep);

        let mut occupied = Vec::new();
        let mut empty = Vec::new();
        self.in_use = 0;

        for (i, chunk) in self.chunks.iter().enumerate() {
            let base = i * self.chunk_size;
            for (j, header) in chunk.iter().enumerate() {
                let index = (base + j) as u64;
                if header.in_use_p() {
                    self.in_use += 1;
                } else if index < self.limit {
                    let target = if chunk_marks[i] { &mut occupied } else { &mut empty };
                    target.push(index as HeaderIndex);
                }
            }
        }

        occupied.extend(empty);
        occupied.reverse();
        self.free_list = occupied;
    }

    fn slot_mut(&mut self, index: HeaderIndex) -> &mut InflatedHeader {
        let index = index as usize;
        &mut self.chunks[index / self.chunk_size][index % self.chunk_size]
    }

    /// Record at `index`, if it is allocated
    pub fn header(&self, index: HeaderIndex) -> Option<&InflatedHeader> {
        let index = index as usize;
        self.chunks
            .get(index / self.chunk_size)
            .map(|chunk| &chunk[index % self.chunk_size])
            .filter(|header| header.in_use_p())
    }

    pub fn header_mut(&mut self, index: HeaderIndex) -> Option<&mut InflatedHeader> {
        let index = index as usize;
        let chunk_size = self.chunk_size;
        self.chunks
            .get_mut(index / chunk_size)
            .map(|chunk| &mut chunk[index % chunk_size])
            .filter(|header| header.in_use_p())
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn free_slots(&self) -> usize {
        self.free_list.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn diagnostic(&self) -> &InflatedHeaderDiagnostics {
        &self.diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(chunk_size: usize) -> InflatedHeaders {
        InflatedHeaders::new(&ImmixConfig {
            inflated_header_chunk_size: chunk_size,
            ..Default::default()
        })
    }

    fn owner(i: usize) -> Address {
        Address::new(0x1000_0000 + i * 16)
    }

    #[test]
    fn test_growth_flags_collection_once() {
        let mut headers = table(4);

        let first = headers.allocate(owner(0));
        assert_eq!(first.index, 0);
        assert!(first.needs_collection);

        for i in 1..4 {
            assert!(!headers.allocate(owner(i)).needs_collection);
        }
        assert!(headers.allocate(owner(4)).needs_collection);
        assert_eq!(headers.chunk_count(), 2);
        assert_eq!(headers.diagnostic().collections, 2);
    }

    #[test]
    fn test_deallocate_keeps_marked_and_reuses_freed() {
        let mut headers = table(16);
        let indices: Vec<_> = (0..10).map(|i| headers.allocate(owner(i)).index).collect();

        for &i in &[1, 4, 7] {
            headers.header_mut(indices[i]).unwrap().mark(5);
        }

        let diag = headers.deallocate_headers(5);
        assert_eq!(diag.objects, 3);
        assert_eq!(headers.in_use(), 3);
        for &i in &[1, 4, 7] {
            assert_eq!(headers.header(indices[i]).unwrap().owner(), owner(i));
        }
        assert!(headers.header(indices[0]).is_none());

        let reused: Vec<_> = (0..7)
            .map(|i| headers.allocate(owner(100 + i)).index)
            .collect();
        assert_eq!(reused, vec![0, 2, 3, 5, 6, 8, 9]);
    }

    #[test]
    fn test_trailing_empty_chunks_released() {
        let mut headers = table(2);
        let indices: Vec<_> = (0..6).map(|i| headers.allocate(owner(i)).index).collect();
        assert_eq!(headers.chunk_count(), 3);

        headers.header_mut(indices[0]).unwrap().mark(2);
        headers.deallocate_headers(2);

        assert_eq!(headers.chunk_count(), 1);
        assert_eq!(headers.free_slots(), 1);
        assert_eq!(headers.allocate(owner(9)).index, 1);
    }

    #[test]
    fn test_occupied_chunks_refill_first() {
        let mut headers = table(2);
        let indices: Vec<_> = (0..6).map(|i| headers.allocate(owner(i)).index).collect();

        // Chunk 1 empty but not trailing, chunk 0 and 2 partly live.
        headers.header_mut(indices[0]).unwrap().mark(3);
        headers.header_mut(indices[5]).unwrap().mark(3);
        headers.deallocate_headers(3);

        let order: Vec<_> = (0..4).map(|i| headers.allocate(owner(i)).index).collect();
        assert_eq!(order, vec![1, 4, 2, 3]);
    }

    #[test]
    fn test_lock_is_reentrant_per_thread() {
        let mut headers = table(4);
        let header = headers.allocate(owner(0)).header;

        assert!(header.lock(7));
        assert!(header.lock(7));
        assert!(!header.lock(8));
        assert!(header.unlock(7));
        assert!(header.locked_p());
        assert!(header.unlock(7));
        assert!(!header.locked_p());
        assert!(!header.unlock(7));
    }

    #[test]
    #[should_panic(expected = "inflated headers active at the same time")]
    fn test_index_space_exhaustion_is_fatal() {
        let mut headers = InflatedHeaders::new(&ImmixConfig {
            inflated_header_chunk_size: 4,
            inflated_header_limit: 6,
            ..Default::default()
        });

        for i in 0..7 {
            headers.allocate(owner(i));
        }
    }
}
