//! ImmixDescriber - object policy for the shared memory subsystem
//!
//! Copies promote young objects into the region, marking propagates to
//! inflated headers, and region growth draws down a per-collection chunk
//! budget.

use super::ObjectDescriber;
use crate::allocator::RegionAllocator;
use crate::logging::GcEvent;
use crate::marker::MarkStack;
use crate::memory::Memory;
use crate::object::{Address, Forwarding, ManagedObject, Zone};
use crate::stats::MemoryMetrics;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub struct ImmixDescriber {
    memory: Arc<Memory>,
    chunks_left: AtomicI64,
    chunks_before_collection: i64,
    promote_on_trace: bool,
}

impl ImmixDescriber {
    pub fn new(memory: Arc<Memory>) -> Self {
        let chunks_before_collection = memory.config().chunks_before_collection;
        let promote_on_trace = memory.config().promote_on_trace;
        Self {
            memory,
            chunks_left: AtomicI64::new(chunks_before_collection),
            chunks_before_collection,
            promote_on_trace,
        }
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    /// Chunks the region may still add before a collection is requested
    pub fn chunks_left(&self) -> i64 {
        self.chunks_left.load(Ordering::Acquire)
    }

    pub fn reset_chunks_left(&self) {
        self.chunks_left
            .store(self.chunks_before_collection, Ordering::Release);
    }
}

impl ObjectDescriber for ImmixDescriber {
    fn copy(&self, original: Address, alloc: &mut dyn RegionAllocator) -> Address {
        let Some(mut copy) = self.memory.with_object(original, ManagedObject::copy_of) else {
            log::warn!("immix: asked to copy unknown object {}", original);
            return Address::null();
        };

        let allocation = alloc.allocate(copy.size_in_bytes());
        if allocation.collect_now {
            self.memory
                .schedule_full_collection("Immix region copy object", None);
        }
        if allocation.address.is_null() {
            return Address::null();
        }

        let addr = allocation.address;
        copy.header.set_zone(Zone::Mature);
        copy.header.set_in_region();
        let inflated = copy.header.inflated_index();

        self.memory.objects().insert(addr, copy);
        if let Some(index) = inflated {
            self.memory.set_inflated_owner(index, addr);
        }

        addr
    }

    fn size(&self, addr: Address) -> usize {
        self.memory
            .with_object(addr, |o| o.size_in_bytes())
            .unwrap_or(0)
    }

    fn mark_address(&self, addr: Address, stack: &mut MarkStack, push: bool) -> bool {
        let mark = self.memory.mark();
        let marked = self.memory.with_object_mut(addr, |o| {
            if o.header.marked_p(mark) {
                return None;
            }
            o.header.mark(mark);
            Some((o.header.in_region_p(), o.header.inflated_index()))
        });

        match marked {
            None => {
                log::warn!("immix: skipping unknown object {} during trace", addr);
                false
            }
            Some(None) => false,
            Some(Some((in_region, inflated))) => {
                if let Some(index) = inflated {
                    self.memory.mark_inflated_header(index, mark);
                }
                if push {
                    stack.push(addr);
                }
                in_region
            }
        }
    }

    fn update_pointer(&self, addr: Address) -> Address {
        if addr.is_null() {
            return Address::null();
        }

        let state = self
            .memory
            .with_object(addr, |o| (o.header.young_object_p(), o.header.forward()));

        match state {
            Some((true, forward)) => forward.unwrap_or_else(Address::null),
            Some((false, _)) => {
                // May hold young references the write barrier never saw.
                self.memory.remember_object(addr);
                addr
            }
            None => Address::null(),
        }
    }

    fn added_chunk(&self, chunks: usize) {
        MemoryMetrics::increment(&self.memory.metrics().immix_chunks);
        self.memory.logger().log(GcEvent::ChunkAdded { chunks });

        if self.chunks_left.fetch_sub(1, Ordering::AcqRel) - 1 <= 0 {
            self.reset_chunks_left();
            self.memory
                .schedule_full_collection("Immix region chunk budget exhausted", None);
        }
    }

    fn forwarding(&self, addr: Address) -> Forwarding {
        self.memory
            .with_object(addr, |o| o.header.forwarding())
            .unwrap_or(Forwarding::Intact)
    }

    fn set_forwarding(&self, from: Address, to: Address) {
        // The stale record is stamped so it survives this cycle's sweep and
        // no later one. Its inflated header now belongs to the copy.
        let mark = self.memory.mark();
        self.memory.with_object_mut(from, |o| {
            o.header.set_forward(to);
            o.header.mark(mark);
            o.header.set_inflated_index(None);
        });
    }

    fn copy_p(&self, addr: Address) -> bool {
        self.promote_on_trace
            && self
                .memory
                .with_object(addr, |o| o.header.young_object_p() && !o.header.forwarded_p())
                .unwrap_or(false)
    }

    fn references(&self, addr: Address) -> Vec<Address> {
        self.memory
            .with_object(addr, |o| o.fields().to_vec())
            .unwrap_or_default()
    }

    fn update_reference(&self, holder: Address, index: usize, to: Address) {
        self.memory.with_object_mut(holder, |o| {
            if let Some(slot) = o.fields_mut().get_mut(index) {
                *slot = to;
            }
        });
    }
}
