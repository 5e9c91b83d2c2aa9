//! Weak References Support
//!
//! Weak references hold an object without keeping it alive. The collector
//! cleans them after marking has reached its fixpoint and *before*
//! finalization retains anything, so a weak reference never observes an
//! object that is only being kept around to run its finalizer.
//!
//! Implementation:
//! - `WeakReference`: atomic referent slot, shared with the runtime via `Arc`
//! - `WeakRefRegistry`: every weak reference the collector must clean

use super::Address;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// WeakReference - a reference that doesn't prevent collection
pub struct WeakReference {
    /// Address of referent object (0 once cleared)
    referent: AtomicUsize,

    /// Registry-assigned id
    id: u64,
}

impl WeakReference {
    fn new(referent: Address, id: u64) -> Self {
        Self {
            referent: AtomicUsize::new(referent.as_usize()),
            id,
        }
    }

    /// Get referent address
    ///
    /// Returns None if referent has been collected.
    pub fn get(&self) -> Option<Address> {
        let addr = self.referent.load(Ordering::Acquire);
        if addr == 0 {
            None
        } else {
            Some(Address::new(addr))
        }
    }

    /// Clear weak reference
    pub fn clear(&self) {
        self.referent.store(0, Ordering::Release);
    }

    /// Point at a relocated referent
    pub fn set(&self, referent: Address) {
        self.referent.store(referent.as_usize(), Ordering::Release);
    }

    /// Check if reference is cleared
    pub fn is_cleared(&self) -> bool {
        self.referent.load(Ordering::Acquire) == 0
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for WeakReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakReference")
            .field("id", &self.id)
            .field("referent", &self.get())
            .finish()
    }
}

/// Outcome of checking one referent during weak reference cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakStatus {
    /// Referent survived at its own address
    Live,
    /// Referent survived at a new address
    Moved(Address),
    /// Referent is unreachable
    Dead,
}

/// WeakRefRegistry - weak references known to the collector
#[derive(Default)]
pub struct WeakRefRegistry {
    refs: Mutex<Vec<Arc<WeakReference>>>,
    next_id: AtomicU64,
}

impl WeakRefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new weak reference to `referent`
    pub fn register(&self, referent: Address) -> Arc<WeakReference> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = Arc::new(WeakReference::new(referent, id));
        self.refs.lock().push(weak.clone());
        weak
    }

    pub fn len(&self) -> usize {
        self.refs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.lock().is_empty()
    }

    /// Clear or redirect every weak reference according to `status`
    ///
    /// References nobody outside the registry holds anymore are dropped.
    /// Returns the number of references cleared.
    pub fn clean<F>(&self, mut status: F) -> usize
    where
        F: FnMut(Address) -> WeakStatus,
    {
        let mut cleared = 0;
        let mut refs = self.refs.lock();

        refs.retain(|weak| {
            if let Some(referent) = weak.get() {
                match status(referent) {
                    WeakStatus::Live => {}
                    WeakStatus::Moved(to) => weak.set(to),
                    WeakStatus::Dead => {
                        weak.clear();
                        cleared += 1;
                    }
                }
            }
            Arc::strong_count(weak) > 1
        });

        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_reference_clear() {
        let registry = WeakRefRegistry::new();
        let weak = registry.register(Address::new(0x1000));

        assert_eq!(weak.get(), Some(Address::new(0x1000)));
        weak.clear();
        assert!(weak.is_cleared());
        assert_eq!(weak.get(), None);
    }

    #[test]
    fn test_clean_applies_status() {
        let registry = WeakRefRegistry::new();
        let live = registry.register(Address::new(0x1000));
        let moved = registry.register(Address::new(0x2000));
        let dead = registry.register(Address::new(0x3000));

        let cleared = registry.clean(|addr| match addr.as_usize() {
            0x1000 => WeakStatus::Live,
            0x2000 => WeakStatus::Moved(Address::new(0x2200)),
            _ => WeakStatus::Dead,
        });

        assert_eq!(cleared, 1);
        assert_eq!(live.get(), Some(Address::new(0x1000)));
        assert_eq!(moved.get(), Some(Address::new(0x2200)));
        assert!(dead.is_cleared());
    }

    #[test]
    fn test_clean_drops_unreferenced_entries() {
        let registry = WeakRefRegistry::new();
        let kept = registry.register(Address::new(0x1000));
        drop(registry.register(Address::new(0x2000)));

        registry.clean(|_| WeakStatus::Live);
        assert_eq!(registry.len(), 1);
        assert_ne!(kept.id(), 0);
    }
}
