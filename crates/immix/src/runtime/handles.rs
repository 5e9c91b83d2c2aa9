//! Native Extension Handles
//!
//! Native code refers to managed objects through handles. The collector
//! scans every in-use, non-weak handle as a root and rewrites it when its
//! object moves. Handles flagged as holding native data are re-traced until
//! fixpoint during `collect_finish`, because native code mutates them
//! without a write barrier.
//!
//! Global handle locations are slots in native memory that point at a
//! handle. A location may be empty, or point at a handle that has since
//! been freed; the latter fails the checksum and is reported, not followed.

use crate::object::Address;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Checksum carried by every live handle
pub const HANDLE_MAGIC: u32 = 0x00ca_bba6;

/// Handle - indirection from native code to a managed object
#[derive(Debug)]
pub struct Handle {
    id: usize,
    object: AtomicUsize,
    checksum: AtomicU32,
    in_use: AtomicBool,
    weak: AtomicBool,
    rdata: AtomicBool,
}

impl Handle {
    fn new(id: usize) -> Self {
        Self {
            id,
            object: AtomicUsize::new(0),
            checksum: AtomicU32::new(0),
            in_use: AtomicBool::new(false),
            weak: AtomicBool::new(false),
            rdata: AtomicBool::new(false),
        }
    }

    fn activate(&self, object: Address) {
        self.object.store(object.as_usize(), Ordering::Release);
        self.weak.store(false, Ordering::Relaxed);
        self.rdata.store(false, Ordering::Relaxed);
        self.checksum.store(HANDLE_MAGIC, Ordering::Release);
        self.in_use.store(true, Ordering::Release);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn object(&self) -> Address {
        Address::new(self.object.load(Ordering::Acquire))
    }

    pub fn set_object(&self, object: Address) {
        self.object.store(object.as_usize(), Ordering::Release);
    }

    pub fn in_use_p(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn weak_p(&self) -> bool {
        self.weak.load(Ordering::Acquire)
    }

    pub fn set_weak(&self, weak: bool) {
        self.weak.store(weak, Ordering::Release);
    }

    /// Handle wraps native data whose references the runtime can't see
    pub fn is_rdata(&self) -> bool {
        self.rdata.load(Ordering::Acquire)
    }

    pub fn set_rdata(&self, rdata: bool) {
        self.rdata.store(rdata, Ordering::Release);
    }

    /// Checksum intact
    pub fn valid_p(&self) -> bool {
        self.checksum.load(Ordering::Acquire) == HANDLE_MAGIC
    }

    /// Destroy the checksum, as happens when native code scribbles over it
    pub fn corrupt(&self) {
        self.checksum.store(0xdead_beef, Ordering::Release);
    }
}

/// HandleTable - allocator of native extension handles
#[derive(Default)]
pub struct HandleTable {
    handles: Mutex<Vec<Arc<Handle>>>,
    free: Mutex<Vec<usize>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for `object`, reusing freed slots first
    pub fn allocate(&self, object: Address) -> Arc<Handle> {
        let mut handles = self.handles.lock();
        let handle = match self.free.lock().pop() {
            Some(id) => handles[id].clone(),
            None => {
                let handle = Arc::new(Handle::new(handles.len()));
                handles.push(handle.clone());
                handle
            }
        };

        handle.activate(object);
        handle
    }

    /// Release a handle; its checksum is cleared
    pub fn free(&self, handle: &Handle) {
        handle.in_use.store(false, Ordering::Release);
        handle.checksum.store(0, Ordering::Release);
        handle.object.store(0, Ordering::Release);
        self.free.lock().push(handle.id);
    }

    /// Every handle slot, in use or not
    pub fn handles(&self) -> MutexGuard<'_, Vec<Arc<Handle>>> {
        self.handles.lock()
    }

    pub fn in_use_count(&self) -> usize {
        self.handles.lock().iter().filter(|h| h.in_use_p()).count()
    }
}

/// GlobalHandle - a native slot pointing at a handle
#[derive(Debug, Default)]
pub struct GlobalHandle {
    slot: Mutex<Option<Arc<Handle>>>,
}

impl GlobalHandle {
    pub fn handle(&self) -> Option<Arc<Handle>> {
        self.slot.lock().clone()
    }

    pub fn set(&self, handle: Option<Arc<Handle>>) {
        *self.slot.lock() = handle;
    }
}

/// GlobalHandleLocations - registered global handle slots
#[derive(Default)]
pub struct GlobalHandleLocations {
    locations: Mutex<Vec<Arc<GlobalHandle>>>,
}

impl GlobalHandleLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a location holding `handle`
    pub fn add(&self, handle: Option<Arc<Handle>>) -> Arc<GlobalHandle> {
        let location = Arc::new(GlobalHandle {
            slot: Mutex::new(handle),
        });
        self.locations.lock().push(location.clone());
        location
    }

    pub fn locations(&self) -> Vec<Arc<GlobalHandle>> {
        self.locations.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.locations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free_reuses_slot() {
        let table = HandleTable::new();
        let a = table.allocate(Address::new(0x1000));
        assert!(a.in_use_p());
        assert!(a.valid_p());
        assert_eq!(a.object(), Address::new(0x1000));

        table.free(&a);
        assert!(!a.in_use_p());
        assert!(!a.valid_p());

        let b = table.allocate(Address::new(0x2000));
        assert_eq!(b.id(), a.id());
        assert_eq!(table.in_use_count(), 1);
        assert_eq!(table.handles().len(), 1);
    }

    #[test]
    fn test_flags() {
        let table = HandleTable::new();
        let handle = table.allocate(Address::new(0x1000));
        handle.set_weak(true);
        handle.set_rdata(true);
        assert!(handle.weak_p());
        assert!(handle.is_rdata());

        handle.corrupt();
        assert!(!handle.valid_p());
    }

    #[test]
    fn test_global_locations() {
        let table = HandleTable::new();
        let globals = GlobalHandleLocations::new();
        let handle = table.allocate(Address::new(0x1000));

        let location = globals.add(Some(handle.clone()));
        globals.add(None);
        assert_eq!(globals.len(), 2);
        assert_eq!(location.handle().unwrap().id(), handle.id());

        location.set(None);
        assert!(location.handle().is_none());
    }
}
