//! Marker Module - Mark-Region Engine
//!
//! `MarkRegion` is the generic tracing core of the collector. It owns the
//! region allocator and the mark stack and drives an `ObjectDescriber` to
//! mark, copy and trace objects:
//!
//! ```text
//! mark_address(addr)
//!   ├─ Forwarded(to)?   → continue with `to`
//!   ├─ copy_p(addr)?    → copy into region, install Forwarded(copy)
//!   ├─ mark_address()   → set mark, push on mark stack
//!   └─ region-resident? → retain the object's lines in its block
//!
//! process_mark_stack()
//!   └─ pop → scan_object → mark_address(each field) → rewrite moved fields
//! ```
//!
//! Marking happens on a single driving thread, so the generation
//! comparison in `mark_address` needs no further synchronization.

pub mod mark_stack;
pub mod roots;

pub use mark_stack::MarkStack;
pub use roots::{GcData, Roots};

use crate::allocator::{Allocation, ImmixAllocator, RegionAllocator};
use crate::config::ImmixConfig;
use crate::heap::BlockAllocator;
use crate::object::{Address, Forwarding};
use crate::relocate::ObjectDescriber;

/// Something that can be told an object is reachable
pub trait Tracer {
    /// Mark `addr` reachable
    ///
    /// Returns the new address if the object was relocated, `None` if it
    /// stays where it is.
    fn saw_object(&mut self, addr: Address) -> Option<Address>;
}

/// MarkRegion - generic mark-region tracing engine
pub struct MarkRegion<D: ObjectDescriber> {
    describer: D,
    allocator: ImmixAllocator,
    mark_stack: MarkStack,
}

impl<D: ObjectDescriber> MarkRegion<D> {
    pub fn new(describer: D, config: &ImmixConfig) -> Self {
        Self {
            describer,
            allocator: ImmixAllocator::new(config),
            mark_stack: MarkStack::new(),
        }
    }

    pub fn describer(&self) -> &D {
        &self.describer
    }

    pub fn allocator(&self) -> &ImmixAllocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut ImmixAllocator {
        &mut self.allocator
    }

    pub fn block_allocator(&self) -> &BlockAllocator {
        self.allocator.blocks()
    }

    pub fn mark_stack(&self) -> &MarkStack {
        &self.mark_stack
    }

    pub fn mark_stack_mut(&mut self) -> &mut MarkStack {
        &mut self.mark_stack
    }

    /// Allocate region space, reporting any growth to the describer
    pub fn allocate(&mut self, bytes: usize) -> Allocation {
        let allocation = self.allocator.allocate(bytes);
        self.flush_added_chunks();
        allocation
    }

    fn flush_added_chunks(&mut self) {
        let added = self.allocator.take_added_chunks();
        if added == 0 {
            return;
        }

        let total = self.allocator.blocks().chunks().len();
        for chunks in (total + 1 - added)..=total {
            self.describer.added_chunk(chunks);
        }
    }

    /// Copy `addr` into the region through the describer
    ///
    /// Returns null if the region could not hold the copy.
    pub fn copy_object(&mut self, addr: Address) -> Address {
        let copy = self.describer.copy(addr, &mut self.allocator);
        self.flush_added_chunks();
        copy
    }

    /// Retain the lines of an object marked outside a trace
    pub fn mark_lines(&mut self, addr: Address, size: usize) {
        if let Some(block) = self.allocator.blocks_mut().block_for_mut(addr) {
            block.mark_object(addr, size);
        }
    }

    /// Mark `addr`, copying it into the region if the describer asks for it
    ///
    /// Returns the object's current address: the forward address if it was
    /// relocated (now or earlier this cycle), `addr` otherwise.
    pub fn mark_address(&mut self, addr: Address, push: bool) -> Address {
        if addr.is_null() {
            return addr;
        }

        let target = match self.describer.forwarding(addr) {
            Forwarding::Forwarded(to) => to,
            Forwarding::Intact if self.describer.copy_p(addr) => {
                let copy = self.copy_object(addr);
                if copy.is_null() {
                    // Region exhausted: the object stays and is marked in place.
                    addr
                } else {
                    self.describer.set_forwarding(addr, copy);
                    copy
                }
            }
            Forwarding::Intact => addr,
        };

        if self
            .describer
            .mark_address(target, &mut self.mark_stack, push)
        {
            let size = self.describer.size(target);
            self.mark_lines(target, size);
        }

        target
    }

    /// Trace every reference of `addr`, rewriting slots whose target moved
    pub fn scan_object(&mut self, addr: Address) {
        let references = self.describer.references(addr);
        for (index, field) in references.into_iter().enumerate() {
            if field.is_null() {
                continue;
            }
            let current = self.mark_address(field, true);
            if current != field {
                self.describer.update_reference(addr, index, current);
            }
        }
    }

    /// Drain the mark stack to fixpoint
    ///
    /// Returns true if any object was traced.
    pub fn process_mark_stack(&mut self) -> bool {
        let mut work = false;
        while let Some(addr) = self.mark_stack.pop() {
            self.scan_object(addr);
            work = true;
        }
        work
    }

    /// Forget all line marks of the previous trace
    pub fn clear_marks(&mut self) {
        self.mark_stack.clear();
        for block in self.allocator.blocks_mut().blocks_mut() {
            block.clear_marks();
        }
    }

    /// Make the current line marks the allocation baseline
    pub fn copy_marks(&mut self) {
        for block in self.allocator.blocks_mut().blocks_mut() {
            block.copy_marks();
        }
    }

    /// Turn unmarked lines into holes and recompute block status
    pub fn sweep_blocks(&mut self) {
        for block in self.allocator.blocks_mut().blocks_mut() {
            block.update_stats();
        }
    }

    /// Whether `addr` lies on a region line holding an object
    pub fn allocated_address(&self, addr: Address) -> bool {
        self.allocator
            .blocks()
            .block_for(addr)
            .map(|block| block.line_in_use(addr))
            .unwrap_or(false)
    }

    /// Recalibrate allocation targets after a sweep
    pub fn restart(&mut self, occupancy: f64, free_bytes: usize) {
        self.allocator.restart(occupancy, free_bytes);
    }
}

impl<D: ObjectDescriber> Tracer for MarkRegion<D> {
    fn saw_object(&mut self, addr: Address) -> Option<Address> {
        if addr.is_null() {
            return None;
        }
        let current = self.mark_address(addr, true);
        (current != addr).then_some(current)
    }
}
