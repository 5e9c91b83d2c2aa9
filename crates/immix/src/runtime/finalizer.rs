//! Finalizer - Object Finalization
//!
//! Objects may register a finalizer to run once they become unreachable.
//! During `collect_finish` the collector takes the list lock, lets
//! `gc_scan` move every unmarked registration to the ready queue (keeping
//! its object alive for one more cycle so the finalizer can still read it),
//! drains the mark stack, and wakes the execution side.
//!
//! Finalizers run either synchronously via `run_pending` or on a background
//! thread started with `start`.

use crate::marker::Tracer;
use crate::memory::Memory;
use crate::object::Address;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

type FinalizerFn = Box<dyn FnOnce(Address) + Send>;

/// Finalizer entry
struct FinalizerEntry {
    /// Object address, updated when the object moves
    object: Address,
    /// Finalizer function
    finalizer_fn: FinalizerFn,
}

/// Registrations guarded by the finalizer lock
#[derive(Default)]
pub struct FinalizerList {
    pending: Vec<FinalizerEntry>,
    ready: VecDeque<FinalizerEntry>,
}

impl FinalizerList {
    /// Queue finalizers of unreachable objects and keep those objects alive
    ///
    /// Reachable registrations follow relocation. Objects already queued
    /// but not yet finalized are retained as well. Returns the number of
    /// newly queued finalizers.
    pub fn gc_scan(&mut self, tracer: &mut dyn Tracer, memory: &Memory) -> usize {
        let mut queued = 0;

        for entry in self.ready.iter_mut() {
            if let Some(fwd) = tracer.saw_object(entry.object) {
                entry.object = fwd;
            }
        }

        let pending = std::mem::take(&mut self.pending);
        for mut entry in pending {
            let current = memory.resolve(entry.object);
            if memory.marked_p(current) {
                entry.object = current;
                self.pending.push(entry);
            } else {
                entry.object = tracer.saw_object(current).unwrap_or(current);
                self.ready.push_back(entry);
                queued += 1;
            }
        }

        queued
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Addresses of objects waiting for their finalizer to run
    pub fn ready_objects(&self) -> Vec<Address> {
        self.ready.iter().map(|e| e.object).collect()
    }
}

/// Finalizer - registration list, wake signal, optional worker thread
pub struct Finalizer {
    list: Mutex<FinalizerList>,
    condition: Condvar,
    running: AtomicBool,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Finalizer {
    /// Create new finalizer
    pub fn new() -> Self {
        Self {
            list: Mutex::new(FinalizerList::default()),
            condition: Condvar::new(),
            running: AtomicBool::new(false),
            thread_handle: Mutex::new(None),
        }
    }

    /// Register finalizer for object
    pub fn register<F>(&self, object: Address, finalizer_fn: F)
    where
        F: FnOnce(Address) + Send + 'static,
    {
        self.list.lock().pending.push(FinalizerEntry {
            object,
            finalizer_fn: Box::new(finalizer_fn),
        });
    }

    /// Acquire the list lock
    pub fn lock_list(&self) -> MutexGuard<'_, FinalizerList> {
        self.list.lock()
    }

    /// Wake the execution side
    pub fn notify(&self) {
        self.condition.notify_one();
    }

    pub fn pending_count(&self) -> usize {
        self.list.lock().pending_count()
    }

    pub fn ready_count(&self) -> usize {
        self.list.lock().ready_count()
    }

    /// Run every queued finalizer on the calling thread
    ///
    /// Finalizers run outside the list lock. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let ready: Vec<FinalizerEntry> = self.list.lock().ready.drain(..).collect();
        let count = ready.len();
        for entry in ready {
            (entry.finalizer_fn)(entry.object);
        }
        count
    }

    /// Start the finalizer thread
    pub fn start(self: &Arc<Self>) -> crate::error::Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let finalizer = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("immix-finalizer".to_string())
            .spawn(move || finalizer.worker_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                crate::error::ImmixError::Internal(format!(
                    "failed to spawn finalizer thread: {}",
                    e
                ))
            })?;

        *self.thread_handle.lock() = Some(handle);
        Ok(())
    }

    fn worker_loop(&self) {
        loop {
            let ready: Vec<FinalizerEntry> = {
                let mut list = self.list.lock();
                while list.ready.is_empty() && self.running.load(Ordering::Acquire) {
                    self.condition.wait(&mut list);
                }
                if list.ready.is_empty() {
                    return;
                }
                list.ready.drain(..).collect()
            };

            for entry in ready {
                (entry.finalizer_fn)(entry.object);
            }
        }
    }

    /// Stop the finalizer thread after it drains the ready queue
    pub fn stop(&self) -> crate::error::Result<()> {
        {
            let _list = self.list.lock();
            self.running.store(false, Ordering::Release);
            self.condition.notify_all();
        }

        if let Some(handle) = self.thread_handle.lock().take() {
            handle
                .join()
                .map_err(|_| crate::error::ImmixError::Internal("finalizer thread panicked".into()))?;
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ManagedObject, Zone};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct MarkingTracer<'a> {
        memory: &'a Memory,
        seen: Vec<Address>,
    }

    impl Tracer for MarkingTracer<'_> {
        fn saw_object(&mut self, addr: Address) -> Option<Address> {
            let mark = self.memory.mark();
            self.memory.with_object_mut(addr, |o| o.header.mark(mark));
            self.seen.push(addr);
            None
        }
    }

    fn object(memory: &Memory, addr: usize) -> Address {
        let address = Address::new(addr);
        memory
            .objects()
            .insert(address, ManagedObject::new(Zone::Mature, 16));
        address
    }

    #[test]
    fn test_gc_scan_queues_unmarked_and_retains_them() {
        let memory = Memory::default();
        let live = object(&memory, 0x1000);
        let dead = object(&memory, 0x2000);
        memory.with_object_mut(live, |o| o.header.mark(memory.mark()));

        let finalizer = Finalizer::new();
        finalizer.register(live, |_| {});
        finalizer.register(dead, |_| {});

        let mut tracer = MarkingTracer {
            memory: &memory,
            seen: Vec::new(),
        };
        let queued = finalizer.lock_list().gc_scan(&mut tracer, &memory);

        assert_eq!(queued, 1);
        assert_eq!(tracer.seen, vec![dead]);
        assert!(memory.marked_p(dead));
        assert_eq!(finalizer.pending_count(), 1);
        assert_eq!(finalizer.lock_list().ready_objects(), vec![dead]);
    }

    #[test]
    fn test_run_pending_executes_once() {
        let memory = Memory::default();
        let dead = object(&memory, 0x2000);
        let calls = Arc::new(AtomicUsize::new(0));

        let finalizer = Finalizer::new();
        let counter = calls.clone();
        finalizer.register(dead, move |addr| {
            assert_eq!(addr, Address::new(0x2000));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut tracer = MarkingTracer {
            memory: &memory,
            seen: Vec::new(),
        };
        finalizer.lock_list().gc_scan(&mut tracer, &memory);

        assert_eq!(finalizer.run_pending(), 1);
        assert_eq!(finalizer.run_pending(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_thread_runs_on_notify() {
        let memory = Memory::default();
        let dead = object(&memory, 0x2000);
        let (tx, rx) = std::sync::mpsc::channel();

        let finalizer = Arc::new(Finalizer::new());
        finalizer.register(dead, move |addr| {
            let _ = tx.send(addr);
        });
        finalizer.start().unwrap();

        {
            let mut list = finalizer.lock_list();
            let mut tracer = MarkingTracer {
                memory: &memory,
                seen: Vec::new(),
            };
            list.gc_scan(&mut tracer, &memory);
            finalizer.notify();
        }

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), dead);
        finalizer.stop().unwrap();
        assert!(!finalizer.is_running());
    }
}
