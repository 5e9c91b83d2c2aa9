//! Object Header - Metadata the collector reads and writes on managed objects
//!
//! Header contents:
//! ┌─────────────────────────────────────────┐
//! │  mark        - generation last marked   │
//! │  zone        - Young | Mature           │
//! │  in_region   - resident in Immix blocks │
//! │  forwarding  - Intact | Forwarded(addr) │
//! │  inflated    - index into side table    │
//! └─────────────────────────────────────────┘
//!
//! The mark is only meaningful relative to the memory's current mark
//! generation: `marked_p(g)` compares for equality, so advancing the
//! generation makes every previous mark stale without touching objects.

use super::Address;

/// Index of an inflated header in the side table
pub type HeaderIndex = u32;

/// Generation an object currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Nursery storage owned by the young collector
    Young,
    /// Promoted into the stable region
    Mature,
}

/// Forwarding slot of an object header
///
/// Only valid once the object has been marked and copied in the current
/// cycle. Readers must match on it instead of trusting a raw address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarding {
    /// Object lives at its own address
    Intact,
    /// Object was relocated; the payload lives at the contained address
    Forwarded(Address),
}

/// Object Header
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    mark: u32,
    zone: Zone,
    in_region: bool,
    forwarding: Forwarding,
    inflated: Option<HeaderIndex>,
}

impl ObjectHeader {
    /// Create new unmarked, intact header in the given zone
    pub fn new(zone: Zone) -> Self {
        Self {
            mark: 0,
            zone,
            in_region: false,
            forwarding: Forwarding::Intact,
            inflated: None,
        }
    }

    /// Header for an object copied from `original`
    ///
    /// Keeps the per-object state (inflated header index, zone) but starts
    /// unmarked and intact, so the copy is traced exactly once.
    pub fn copied_from(original: &ObjectHeader) -> Self {
        Self {
            mark: 0,
            zone: original.zone,
            in_region: original.in_region,
            forwarding: Forwarding::Intact,
            inflated: original.inflated,
        }
    }

    // === Mark Operations ===

    #[inline]
    pub fn marked_p(&self, mark: u32) -> bool {
        self.mark == mark
    }

    #[inline]
    pub fn mark(&mut self, mark: u32) {
        self.mark = mark;
    }

    #[inline]
    pub fn mark_value(&self) -> u32 {
        self.mark
    }

    // === Zone Operations ===

    #[inline]
    pub fn zone(&self) -> Zone {
        self.zone
    }

    #[inline]
    pub fn set_zone(&mut self, zone: Zone) {
        self.zone = zone;
    }

    #[inline]
    pub fn young_object_p(&self) -> bool {
        self.zone == Zone::Young
    }

    #[inline]
    pub fn in_region_p(&self) -> bool {
        self.in_region
    }

    #[inline]
    pub fn set_in_region(&mut self) {
        self.in_region = true;
    }

    #[inline]
    pub fn clear_in_region(&mut self) {
        self.in_region = false;
    }

    // === Forwarding Operations ===

    #[inline]
    pub fn forwarding(&self) -> Forwarding {
        self.forwarding
    }

    #[inline]
    pub fn forwarded_p(&self) -> bool {
        matches!(self.forwarding, Forwarding::Forwarded(_))
    }

    /// Forward address if the object was relocated
    #[inline]
    pub fn forward(&self) -> Option<Address> {
        match self.forwarding {
            Forwarding::Forwarded(to) => Some(to),
            Forwarding::Intact => None,
        }
    }

    #[inline]
    pub fn set_forward(&mut self, to: Address) {
        self.forwarding = Forwarding::Forwarded(to);
    }

    // === Inflated Header ===

    #[inline]
    pub fn inflated_index(&self) -> Option<HeaderIndex> {
        self.inflated
    }

    #[inline]
    pub fn set_inflated_index(&mut self, index: Option<HeaderIndex>) {
        self.inflated = index;
    }
}
