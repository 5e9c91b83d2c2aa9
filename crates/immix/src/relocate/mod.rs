//! Relocate Module - Object Describer
//!
//! The mark-region engine is generic over an `ObjectDescriber`: the policy
//! object that knows how objects of one memory manager are copied, sized,
//! marked and repaired. The engine never touches an object except through
//! it, so it can be driven by a mock in tests.
//!
//! Policy operations:
//! - `copy`: promote an object into the region
//! - `size`: self-reported object size
//! - `mark_address`: mark in the current generation, optionally push
//! - `update_pointer`: repair a reference during a young pass
//! - `added_chunk`: react to region growth
//!
//! The remaining methods expose the header and field access the engine
//! needs to forward objects and trace their references.

pub mod describer;

pub use describer::ImmixDescriber;

use crate::allocator::RegionAllocator;
use crate::marker::MarkStack;
use crate::object::{Address, Forwarding};

pub trait ObjectDescriber {
    /// Copy `original` into space obtained from `alloc`
    ///
    /// The copy is mature and region-resident. Returns null if the
    /// allocation could not be satisfied.
    fn copy(&self, original: Address, alloc: &mut dyn RegionAllocator) -> Address;

    /// Size of the object in bytes
    fn size(&self, addr: Address) -> usize;

    /// Mark `addr` in the current generation
    ///
    /// Returns false if it was already marked. Otherwise pushes it when
    /// `push` is set and returns whether the object is region-resident,
    /// i.e. whether its block lines must be retained.
    fn mark_address(&self, addr: Address, stack: &mut MarkStack, push: bool) -> bool;

    /// Repair a reference seen during a young-generation pass
    ///
    /// Young targets resolve to their forward address, or null if they did
    /// not survive. Mature targets are remembered and returned unchanged.
    fn update_pointer(&self, addr: Address) -> Address;

    /// The region now holds `chunks` chunks
    fn added_chunk(&self, chunks: usize);

    /// Forwarding state of the object at `addr`
    fn forwarding(&self, addr: Address) -> Forwarding;

    /// Record that `from` now lives at `to`
    fn set_forwarding(&self, from: Address, to: Address);

    /// Whether tracing should relocate this object into the region
    fn copy_p(&self, addr: Address) -> bool;

    /// Outgoing references of the object at `addr`
    fn references(&self, addr: Address) -> Vec<Address>;

    /// Overwrite reference `index` of `holder`
    fn update_reference(&self, holder: Address, index: usize, to: Address);
}
