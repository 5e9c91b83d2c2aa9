//! Thread Registry
//!
//! Every runtime thread the collector must scan. The registry lock is held
//! only while enumerating threads, either to scan their local roots or to
//! clean their locked-object lists; tracing happens after it is released.

use crate::error::Result;
use crate::memory::Memory;
use crate::object::Address;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// ManagedThread - a runtime thread as seen by the collector
pub struct ManagedThread {
    id: u64,
    name: String,
    roots: Mutex<Vec<Address>>,
    locked_objects: Mutex<Vec<Address>>,
}

impl ManagedThread {
    fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            roots: Mutex::new(Vec::new()),
            locked_objects: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push a local root, returning its slot index
    pub fn push_root(&self, addr: Address) -> usize {
        let mut roots = self.roots.lock();
        roots.push(addr);
        roots.len() - 1
    }

    pub fn root(&self, slot: usize) -> Option<Address> {
        self.roots.lock().get(slot).copied()
    }

    pub fn clear_roots(&self) {
        self.roots.lock().clear();
    }

    /// Local root slots, rewritable in place
    pub fn roots(&self) -> MutexGuard<'_, Vec<Address>> {
        self.roots.lock()
    }

    /// Acquire the inflated lock of `addr` for this thread
    ///
    /// Returns false if another thread holds it.
    pub fn lock_object(&self, memory: &Memory, addr: Address) -> Result<bool> {
        let id = self.id;
        let acquired = memory.with_inflated_header(addr, |header| header.lock(id))?;

        if acquired {
            let mut locked = self.locked_objects.lock();
            if !locked.contains(&addr) {
                locked.push(addr);
            }
        }
        Ok(acquired)
    }

    /// Release one level of the inflated lock of `addr`
    pub fn unlock_object(&self, memory: &Memory, addr: Address) -> Result<bool> {
        let id = self.id;
        let (released, still_held) = memory.with_inflated_header(addr, |header| {
            let released = header.unlock(id);
            (released, header.locked_p())
        })?;

        if released && !still_held {
            self.locked_objects.lock().retain(|&a| a != addr);
        }
        Ok(released)
    }

    pub fn locked_objects(&self) -> Vec<Address> {
        self.locked_objects.lock().clone()
    }

    /// Drop locked objects that did not survive the current trace
    ///
    /// Survivors follow relocation. Returns the number removed.
    pub fn clean_locked_objects(&self, memory: &Memory) -> usize {
        let mut locked = self.locked_objects.lock();
        let before = locked.len();

        let survivors: Vec<Address> = locked
            .iter()
            .map(|&addr| memory.resolve(addr))
            .filter(|&addr| memory.marked_p(addr))
            .collect();
        *locked = survivors;

        before - locked.len()
    }
}

/// ThreadNexus - registry of all managed threads
#[derive(Default)]
pub struct ThreadNexus {
    threads: Mutex<Vec<Arc<ManagedThread>>>,
    next_id: AtomicU64,
}

impl ThreadNexus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new thread
    pub fn new_thread(&self, name: &str) -> Arc<ManagedThread> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let thread = Arc::new(ManagedThread::new(id, name));
        self.threads.lock().push(thread.clone());
        thread
    }

    /// Unregister a thread; its roots stop being scanned
    pub fn remove_thread(&self, id: u64) -> Option<Arc<ManagedThread>> {
        let mut threads = self.threads.lock();
        let position = threads.iter().position(|t| t.id() == id)?;
        Some(threads.remove(position))
    }

    /// Acquire the registry lock
    pub fn threads(&self) -> MutexGuard<'_, Vec<Arc<ManagedThread>>> {
        self.threads.lock()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }
}
