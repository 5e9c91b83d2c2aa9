//! Memory Module - Shared State of the Memory Subsystem
//!
//! `Memory` is the part of the runtime's memory manager the collector
//! reads from and writes into:
//!
//! ```text
//! ┌──────────────────────── Memory ────────────────────────┐
//! │ objects        ObjectSpace (every managed object)       │
//! │ mark           current mark generation                  │
//! │ remembered     mature holders of young references       │
//! │ marked_set     objects kept alive outside normal roots  │
//! │ weak_refs      weak references to clean after marking   │
//! │ inflated       inflated header side table               │
//! │ finalizer      pending finalizers + wake signal         │
//! │ requests       deferred full collection requests        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Lock order: `objects` before any other lock in this struct.

pub mod inflated;
pub mod remembered;

pub use inflated::{InflatedHeader, InflatedHeaders, LockState};
pub use remembered::RememberedSet;

use crate::config::{ImmixConfig, OBJECT_ALIGNMENT, YOUNG_BASE};
use crate::error::{ImmixError, Result};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig};
use crate::object::weak::WeakRefRegistry;
use crate::object::{Address, HeaderIndex, ManagedObject, ObjectSpace, Zone};
use crate::runtime::finalizer::Finalizer;
use crate::stats::{InflatedHeaderDiagnostics, MemoryMetrics};
use crate::util::Alignment;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory - state shared by the collector, the mutator and the runtime
pub struct Memory {
    config: ImmixConfig,

    objects: Mutex<ObjectSpace>,
    mark: AtomicU32,
    mature_gc_in_progress: AtomicBool,

    remembered: Mutex<RememberedSet>,
    marked_set: Mutex<Vec<Address>>,
    weak_refs: WeakRefRegistry,
    inflated: Mutex<InflatedHeaders>,
    finalizer: Arc<Finalizer>,

    requests: Mutex<Vec<String>>,
    young_cursor: AtomicUsize,
    next_hash: AtomicU64,

    metrics: MemoryMetrics,
    logger: GcLogger,
}

impl Memory {
    pub fn new(config: ImmixConfig) -> Self {
        let logger = GcLogger::new(GcLoggerConfig {
            console: config.verbose,
            ..Default::default()
        });
        Self::with_logger(config, logger)
    }

    pub fn with_logger(config: ImmixConfig, logger: GcLogger) -> Self {
        Self {
            inflated: Mutex::new(InflatedHeaders::new(&config)),
            config,
            objects: Mutex::new(ObjectSpace::new()),
            mark: AtomicU32::new(1),
            mature_gc_in_progress: AtomicBool::new(false),
            remembered: Mutex::new(RememberedSet::new()),
            marked_set: Mutex::new(Vec::new()),
            weak_refs: WeakRefRegistry::new(),
            finalizer: Arc::new(Finalizer::new()),
            requests: Mutex::new(Vec::new()),
            young_cursor: AtomicUsize::new(0),
            next_hash: AtomicU64::new(1),
            metrics: MemoryMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &ImmixConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MemoryMetrics {
        &self.metrics
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn finalizer(&self) -> &Arc<Finalizer> {
        &self.finalizer
    }

    pub fn weak_refs(&self) -> &WeakRefRegistry {
        &self.weak_refs
    }

    // === Mark generation ===

    /// Current mark generation
    #[inline]
    pub fn mark(&self) -> u32 {
        self.mark.load(Ordering::Acquire)
    }

    /// Advance the mark generation, making every existing mark stale
    ///
    /// Zero is skipped because fresh headers start with mark 0.
    pub fn rotate_mark(&self) -> u32 {
        let mut next = self.mark().wrapping_add(1);
        if next == 0 {
            next = 1;
        }
        self.mark.store(next, Ordering::Release);
        next
    }

    pub fn mature_gc_in_progress(&self) -> bool {
        self.mature_gc_in_progress.load(Ordering::Acquire)
    }

    pub fn set_mature_gc_in_progress(&self, value: bool) {
        self.mature_gc_in_progress.store(value, Ordering::Release);
    }

    // === Object store ===

    /// Lock the object store
    pub fn objects(&self) -> MutexGuard<'_, ObjectSpace> {
        self.objects.lock()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.objects.lock().contains(addr)
    }

    pub fn with_object<R>(&self, addr: Address, f: impl FnOnce(&ManagedObject) -> R) -> Option<R> {
        self.objects.lock().get(addr).map(f)
    }

    pub fn with_object_mut<R>(
        &self,
        addr: Address,
        f: impl FnOnce(&mut ManagedObject) -> R,
    ) -> Option<R> {
        self.objects.lock().get_mut(addr).map(f)
    }

    /// Allocate an object in young storage
    ///
    /// Stands in for the young generation's nursery: addresses come from a
    /// private bump cursor disjoint from the region. Objects allocated
    /// during a mature cycle are born marked.
    pub fn allocate_young(&self, size: usize) -> Address {
        let bytes = Alignment::align_up(size.max(OBJECT_ALIGNMENT), OBJECT_ALIGNMENT);
        let offset = self.young_cursor.fetch_add(bytes, Ordering::Relaxed);
        let addr = YOUNG_BASE.offset(offset);

        let mut object = ManagedObject::new(Zone::Young, size);
        if self.mature_gc_in_progress() {
            object.header.mark(self.mark());
        }
        self.objects.lock().insert(addr, object);
        addr
    }

    /// Follow forwarding to the current location of an object
    pub fn resolve(&self, addr: Address) -> Address {
        self.objects
            .lock()
            .get(addr)
            .and_then(|o| o.header.forward())
            .unwrap_or(addr)
    }

    /// Whether the object at `addr` is marked in the current generation
    pub fn marked_p(&self, addr: Address) -> bool {
        let mark = self.mark();
        self.objects
            .lock()
            .get(addr)
            .map(|o| o.header.marked_p(mark))
            .unwrap_or(false)
    }

    pub fn fields(&self, holder: Address) -> Result<Vec<Address>> {
        self.with_object(holder, |o| o.fields().to_vec())
            .ok_or(ImmixError::UnknownObject { address: holder })
    }

    pub fn read_field(&self, holder: Address, index: usize) -> Result<Address> {
        let value = self
            .with_object(holder, |o| o.fields().get(index).copied())
            .ok_or(ImmixError::UnknownObject { address: holder })?;

        value.ok_or_else(|| {
            ImmixError::InvalidArgument(format!("{} has no field {}", holder, index))
        })
    }

    /// Append a reference field, running the write barrier
    pub fn push_field(&self, holder: Address, value: Address) -> Result<usize> {
        let index = self
            .with_object_mut(holder, |o| {
                o.fields_mut().push(value);
                o.fields().len() - 1
            })
            .ok_or(ImmixError::UnknownObject { address: holder })?;

        self.write_barrier(holder, value);
        Ok(index)
    }

    /// Store `value` into field `index` of `holder`, running the write barrier
    pub fn write_field(&self, holder: Address, index: usize, value: Address) -> Result<()> {
        let stored = self
            .with_object_mut(holder, |o| match o.fields_mut().get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            })
            .ok_or(ImmixError::UnknownObject { address: holder })?;

        if !stored {
            return Err(ImmixError::InvalidArgument(format!(
                "{} has no field {}",
                holder, index
            )));
        }

        self.write_barrier(holder, value);
        Ok(())
    }

    /// Remember a mature holder that now references a young object
    fn write_barrier(&self, holder: Address, value: Address) {
        if value.is_null() {
            return;
        }

        let needs_remember = {
            let objects = self.objects.lock();
            let holder_mature = objects
                .get(holder)
                .map(|o| !o.header.young_object_p())
                .unwrap_or(false);
            let value_young = objects
                .get(value)
                .map(|o| o.header.young_object_p())
                .unwrap_or(false);
            holder_mature && value_young
        };

        if needs_remember {
            self.remember_object(holder);
        }
    }

    // === Remembered set ===

    /// Remember a mature object that may reference young objects
    pub fn remember_object(&self, addr: Address) {
        let mark = self.mark();
        self.remembered.lock().remember(addr, mark);
    }

    pub fn remembered_p(&self, addr: Address) -> bool {
        self.remembered.lock().contains(addr)
    }

    pub fn remembered_set(&self) -> MutexGuard<'_, RememberedSet> {
        self.remembered.lock()
    }

    /// Purge remembered entries that did not survive generation `mark`
    pub fn unremember_objects(&self, mark: u32) -> usize {
        let objects = self.objects.lock();
        self.remembered.lock().unremember_objects(mark, &objects)
    }

    // === Explicitly remembered objects ===

    /// Keep `addr` alive through the next full collection
    pub fn add_to_marked_set(&self, addr: Address) {
        self.marked_set.lock().push(addr);
    }

    /// Take the current marked set, leaving an empty one behind
    pub fn swap_marked_set(&self) -> Vec<Address> {
        std::mem::take(&mut *self.marked_set.lock())
    }

    pub fn marked_set_len(&self) -> usize {
        self.marked_set.lock().len()
    }

    // === Collection scheduling ===

    /// Request a full collection at the next safe point
    ///
    /// Never collects synchronously. `metric`, if given, is bumped along
    /// with the total request counter.
    pub fn schedule_full_collection(&self, reason: &str, metric: Option<&AtomicU64>) {
        MemoryMetrics::increment(&self.metrics.full_collections_scheduled);
        if let Some(counter) = metric {
            MemoryMetrics::increment(counter);
        }

        self.requests.lock().push(reason.to_string());
        self.logger.log(GcEvent::CollectionScheduled {
            reason: reason.to_string(),
        });
    }

    pub fn collection_requested(&self) -> bool {
        !self.requests.lock().is_empty()
    }

    /// Drain pending collection requests, oldest first
    pub fn take_collection_requests(&self) -> Vec<String> {
        std::mem::take(&mut *self.requests.lock())
    }

    // === Inflated headers ===

    /// Inflated header index of `addr`, allocating one if needed
    pub fn inflate_header(&self, addr: Address) -> Result<HeaderIndex> {
        let mark = self.mark();
        let (index, needs_collection) = {
            let mut objects = self.objects.lock();
            let addr = objects
                .get(addr)
                .and_then(|o| o.header.forward())
                .unwrap_or(addr);
            let object = objects
                .get_mut(addr)
                .ok_or(ImmixError::UnknownObject { address: addr })?;

            if let Some(index) = object.header.inflated_index() {
                return Ok(index);
            }

            let mut headers = self.inflated.lock();
            let allocation = headers.allocate(addr);
            if object.header.marked_p(mark) {
                allocation.header.mark(mark);
            }
            object.header.set_inflated_index(Some(allocation.index));
            (allocation.index, allocation.needs_collection)
        };

        if needs_collection {
            self.schedule_full_collection("Inflated headers", Some(&self.metrics.headers_set));
        }

        Ok(index)
    }

    /// Run `f` on the inflated header of `addr`, inflating it first
    pub fn with_inflated_header<R>(
        &self,
        addr: Address,
        f: impl FnOnce(&mut InflatedHeader) -> R,
    ) -> Result<R> {
        let index = self.inflate_header(addr)?;
        self.inflated
            .lock()
            .header_mut(index)
            .map(f)
            .ok_or_else(|| ImmixError::Internal(format!("inflated header {} not allocated", index)))
    }

    /// Identity hash of `addr`, assigned on first request
    pub fn identity_hash(&self, addr: Address) -> Result<u64> {
        let candidate = self.next_hash.fetch_add(1, Ordering::Relaxed);
        self.with_inflated_header(addr, |header| match header.identity_hash() {
            Some(hash) => hash,
            None => {
                header.set_identity_hash(candidate);
                candidate
            }
        })
    }

    pub fn inflated_headers(&self) -> MutexGuard<'_, InflatedHeaders> {
        self.inflated.lock()
    }

    /// Mark the inflated header at `index` with `mark`
    pub fn mark_inflated_header(&self, index: HeaderIndex, mark: u32) {
        if let Some(header) = self.inflated.lock().header_mut(index) {
            header.mark(mark);
        }
    }

    /// Point the inflated header at `index` at a relocated owner
    pub fn set_inflated_owner(&self, index: HeaderIndex, owner: Address) {
        if let Some(header) = self.inflated.lock().header_mut(index) {
            header.set_owner(owner);
        }
    }

    /// Sweep the inflated header table with generation `mark`
    pub fn deallocate_inflated_headers(&self, mark: u32) -> InflatedHeaderDiagnostics {
        let diagnostic = self.inflated.lock().deallocate_headers(mark);
        self.logger.log(GcEvent::HeaderSweep {
            mark,
            retained: diagnostic.objects,
        });
        diagnostic
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(ImmixConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mature(memory: &Memory, addr: usize) -> Address {
        let address = Address::new(addr);
        let mut object = ManagedObject::new(Zone::Mature, 32);
        object.header.set_in_region();
        memory.objects().insert(address, object);
        address
    }

    #[test]
    fn test_rotate_mark_skips_zero() {
        let memory = Memory::default();
        assert_eq!(memory.mark(), 1);
        assert_eq!(memory.rotate_mark(), 2);

        memory.mark.store(u32::MAX, Ordering::Release);
        assert_eq!(memory.rotate_mark(), 1);
    }

    #[test]
    fn test_young_allocation_is_disjoint_and_aligned() {
        let memory = Memory::default();
        let a = memory.allocate_young(10);
        let b = memory.allocate_young(10);

        assert_eq!(a, YOUNG_BASE);
        assert_eq!(b, YOUNG_BASE.offset(16));
        assert!(memory.with_object(a, |o| o.header.young_object_p()).unwrap());
    }

    #[test]
    fn test_write_barrier_remembers_mature_holder() {
        let memory = Memory::default();
        let holder = mature(&memory, 0x1000_0000);
        let young = memory.allocate_young(16);
        let other = mature(&memory, 0x1000_0040);

        memory.push_field(holder, other).unwrap();
        assert!(!memory.remembered_p(holder));

        memory.write_field(holder, 0, young).unwrap();
        assert!(memory.remembered_p(holder));
        assert_eq!(memory.read_field(holder, 0).unwrap(), young);
    }

    #[test]
    fn test_field_access_on_unknown_object() {
        let memory = Memory::default();
        let err = memory.push_field(Address::new(0x40), Address::null());
        assert!(matches!(err, Err(ImmixError::UnknownObject { .. })));

        let holder = mature(&memory, 0x1000_0000);
        assert!(matches!(
            memory.write_field(holder, 3, Address::null()),
            Err(ImmixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_schedule_full_collection_is_deferred() {
        let memory = Memory::default();
        memory.schedule_full_collection("Immix region copy object", None);

        assert!(memory.collection_requested());
        assert_eq!(
            MemoryMetrics::read(&memory.metrics().full_collections_scheduled),
            1
        );
        assert_eq!(
            memory.take_collection_requests(),
            vec!["Immix region copy object".to_string()]
        );
        assert!(!memory.collection_requested());
    }

    #[test]
    fn test_inflate_header_schedules_on_growth() {
        let memory = Memory::default();
        let a = mature(&memory, 0x1000_0000);

        let index = memory.inflate_header(a).unwrap();
        assert_eq!(memory.inflate_header(a).unwrap(), index);
        assert_eq!(MemoryMetrics::read(&memory.metrics().headers_set), 1);
        assert_eq!(
            memory.take_collection_requests(),
            vec!["Inflated headers".to_string()]
        );
    }

    #[test]
    fn test_identity_hash_is_stable() {
        let memory = Memory::default();
        let a = mature(&memory, 0x1000_0000);
        let b = mature(&memory, 0x1000_0040);

        let hash = memory.identity_hash(a).unwrap();
        assert_eq!(memory.identity_hash(a).unwrap(), hash);
        assert_ne!(memory.identity_hash(b).unwrap(), hash);
    }

    #[test]
    fn test_swap_marked_set() {
        let memory = Memory::default();
        memory.add_to_marked_set(Address::new(0x1000));
        assert_eq!(memory.swap_marked_set(), vec![Address::new(0x1000)]);
        assert_eq!(memory.marked_set_len(), 0);
    }
}
