//! Root Scanning Inputs
//!
//! Roots are starting points for marking. A collection pass receives them
//! bundled in a `GcData`, visited in this order:
//!
//! 1. **Root set** - slots supplied by the caller
//! 2. **Thread roots** - each registered thread's local roots
//! 3. **Handles** - in-use, non-weak native extension handles
//! 4. **Global handle locations** - native slots pointing at handles
//!
//! Every slot is rewritten in place when its object is relocated, which is
//! how tables the collector does not own stay consistent with a moving
//! collector.

use crate::object::Address;
use crate::runtime::{GlobalHandleLocations, HandleTable, ThreadNexus};

/// Roots - caller-supplied root slots
#[derive(Debug, Default, Clone)]
pub struct Roots {
    slots: Vec<Address>,
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root, returning its slot index
    pub fn push(&mut self, addr: Address) -> usize {
        self.slots.push(addr);
        self.slots.len() - 1
    }

    pub fn get(&self, slot: usize) -> Option<Address> {
        self.slots.get(slot).copied()
    }

    /// Overwrite a slot; null drops the root
    pub fn set(&mut self, slot: usize, addr: Address) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = addr;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Address> {
        self.slots.iter_mut()
    }
}

/// GcData - scan context for one collection pass
pub struct GcData<'a> {
    roots: &'a mut Roots,
    threads: &'a ThreadNexus,
    handles: &'a HandleTable,
    global_handles: Option<&'a GlobalHandleLocations>,
}

impl<'a> GcData<'a> {
    pub fn new(
        roots: &'a mut Roots,
        threads: &'a ThreadNexus,
        handles: &'a HandleTable,
        global_handles: Option<&'a GlobalHandleLocations>,
    ) -> Self {
        Self {
            roots,
            threads,
            handles,
            global_handles,
        }
    }

    pub fn roots(&mut self) -> &mut Roots {
        &mut *self.roots
    }

    pub fn thread_nexus(&self) -> &'a ThreadNexus {
        self.threads
    }

    pub fn handles(&self) -> &'a HandleTable {
        self.handles
    }

    pub fn global_handle_locations(&self) -> Option<&'a GlobalHandleLocations> {
        self.global_handles
    }
}
