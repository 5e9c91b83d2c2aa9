//! Runtime Module - Collaborators the collector scans
//!
//! The collector owns none of these; the runtime does. They are bundled
//! into a `GcData` for the duration of a scan:
//! - `threads`: thread registry with per-thread roots and locked objects
//! - `handles`: native extension handles and global handle locations
//! - `finalizer`: finalizer registrations and their execution side

pub mod finalizer;
pub mod handles;
pub mod threads;

pub use finalizer::{Finalizer, FinalizerList};
pub use handles::{GlobalHandle, GlobalHandleLocations, Handle, HandleTable};
pub use threads::{ManagedThread, ThreadNexus};

use crate::marker::roots::{GcData, Roots};

/// RuntimeState - the root sources of one runtime instance
#[derive(Default)]
pub struct RuntimeState {
    pub roots: Roots,
    pub threads: ThreadNexus,
    pub handles: HandleTable,
    pub global_handles: GlobalHandleLocations,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow everything a collection pass scans
    pub fn gc_data(&mut self) -> GcData<'_> {
        GcData::new(
            &mut self.roots,
            &self.threads,
            &self.handles,
            Some(&self.global_handles),
        )
    }
}
