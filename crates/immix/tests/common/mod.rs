//! Test Utilities for the Immix Test Suite
//!
//! A fixture bundling a memory subsystem, a collector and the runtime
//! state it scans, plus strict assertion helpers. Assertions carry a
//! context string so a failure names the scenario that broke.

#![allow(dead_code)]

use immix::{Address, ImmixCollector, ImmixConfig, Memory, ObjectPosition, RuntimeState};
use std::collections::HashSet;
use std::sync::Arc;

/// Test fixture for collector operations
pub struct ImmixFixture {
    pub memory: Arc<Memory>,
    pub gc: ImmixCollector,
    pub runtime: RuntimeState,
}

impl ImmixFixture {
    /// Create fixture with default configuration
    pub fn with_defaults() -> Self {
        Self::with_config(ImmixConfig::default())
    }

    /// Create fixture with custom configuration
    pub fn with_config(config: ImmixConfig) -> Self {
        let memory = Arc::new(Memory::new(config));
        let gc = ImmixCollector::new(memory.clone())
            .expect("collector initialization should succeed with valid config");

        Self {
            memory,
            gc,
            runtime: RuntimeState::new(),
        }
    }

    /// Allocate a mature region object
    #[track_caller]
    pub fn allocate(&mut self, size: usize) -> Address {
        self.gc
            .allocate(size)
            .unwrap_or_else(|| panic!("region allocation of {} bytes failed", size))
    }

    /// Allocate a young object outside the region
    pub fn young(&self, size: usize) -> Address {
        self.memory.allocate_young(size)
    }

    /// Register `addr` as a root, returning its slot
    pub fn root(&mut self, addr: Address) -> usize {
        self.runtime.roots.push(addr)
    }

    /// Current value of root `slot`
    #[track_caller]
    pub fn root_at(&self, slot: usize) -> Address {
        self.runtime
            .roots
            .get(slot)
            .unwrap_or_else(|| panic!("no root slot {}", slot))
    }

    /// Append a reference from `holder` to `value`
    #[track_caller]
    pub fn link(&self, holder: Address, value: Address) -> usize {
        self.memory
            .push_field(holder, value)
            .unwrap_or_else(|e| panic!("linking {} -> {} failed: {}", holder, value, e))
    }

    /// Run a complete cycle
    #[track_caller]
    pub fn collect(&mut self) {
        let mut data = self.runtime.gc_data();
        self.gc
            .collect(&mut data)
            .expect("collection should complete successfully");
    }
}

/// Assert that a region object survived the last cycle
#[track_caller]
pub fn assert_alive(fixture: &ImmixFixture, addr: Address, context: &str) {
    assert!(
        fixture.memory.contains(addr),
        "{}: object {} was reclaimed while still reachable",
        context,
        addr
    );
    assert_eq!(
        fixture.gc.validate_object(addr),
        ObjectPosition::InRegion,
        "{}: surviving object {} is not a valid region object",
        context,
        addr
    );
}

/// Assert that a region object was reclaimed by the last cycle
#[track_caller]
pub fn assert_reclaimed(fixture: &ImmixFixture, addr: Address, context: &str) {
    assert!(
        !fixture.memory.contains(addr),
        "{}: unreachable object {} survived the collection",
        context,
        addr
    );
}

/// Assert that all addresses are unique
#[track_caller]
pub fn assert_all_addresses_unique(addresses: &[Address], context: &str) {
    let unique: HashSet<_> = addresses.iter().collect();

    assert_eq!(
        unique.len(),
        addresses.len(),
        "{}: found {} duplicate addresses out of {}",
        context,
        addresses.len() - unique.len(),
        addresses.len()
    );
}
