//! GC Core Module - Mature Collection Cycle
//!
//! `ImmixCollector` drives one mark-region collection of the mature
//! generation through four phases, each a separate call so the caller can
//! interleave its own work (young passes, safepoints) between them:
//!
//! ```text
//! Idle/Swept ─clear_marks─▶ MarksCleared ─collect_scan─▶ Scanning
//!                                │                          │ process_mark_stack
//!                                │                          ▼
//!                                └──────collect_finish──▶ Draining
//!                                                           │ collect_finish
//!                                                           ▼
//!                          Swept ◀────────sweep──────── Finishing
//! ```
//!
//! Marking uses a rotating generation number, so clearing marks never
//! touches object headers. While a cycle is in progress new region
//! objects are allocated black.

use crate::config::BLOCK_SIZE;
use crate::error::{ImmixError, Result};
use crate::logging::GcEvent;
use crate::marker::{GcData, MarkRegion, MarkStack, Tracer};
use crate::memory::Memory;
use crate::object::weak::WeakStatus;
use crate::object::{Address, ManagedObject, ObjectSpace, Zone};
use crate::relocate::{ImmixDescriber, ObjectDescriber};
use crate::runtime::Handle;
use crate::stats::{
    DiagnosticsSink, DiagnosticsSnapshot, GcTimer, ImmixDiagnostics, InflatedHeaderDiagnostics,
    MemoryMetrics, StopWatch,
};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Collection cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// No cycle has run yet
    Idle,
    /// Mark generation rotated, line marks cleared
    MarksCleared,
    /// Roots are being scanned
    Scanning,
    /// Mark stack drained at least once
    Draining,
    /// Marking complete, weak state cleaned
    Finishing,
    /// Region swept, allocator restarted
    Swept,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectorState::Idle => "idle",
            CollectorState::MarksCleared => "marks-cleared",
            CollectorState::Scanning => "scanning",
            CollectorState::Draining => "draining",
            CollectorState::Finishing => "finishing",
            CollectorState::Swept => "swept",
        };
        f.write_str(name)
    }
}

/// Where an address sits relative to the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPosition {
    /// Region object with a consistent header
    InRegion,
    /// Address lies on allocated region lines but the header disagrees
    InRegionCorruptHeader,
    /// Not on any allocated region line
    Unknown,
}

/// ImmixCollector - mature-generation mark-region collector
pub struct ImmixCollector {
    memory: Arc<Memory>,
    gc: MarkRegion<ImmixDescriber>,
    state: CollectorState,
    cycle: u64,
    diagnostic: ImmixDiagnostics,
    header_diagnostic: InflatedHeaderDiagnostics,
    sink: Option<Arc<dyn DiagnosticsSink>>,
    // Global locations already reported corrupt this cycle
    bad_locations: FxHashSet<usize>,
}

impl ImmixCollector {
    /// Create a collector over `memory`
    ///
    /// # Errors
    /// Returns `ImmixError::Configuration` if the memory's configuration
    /// does not validate.
    pub fn new(memory: Arc<Memory>) -> Result<Self> {
        memory
            .config()
            .validate()
            .map_err(|e| ImmixError::Configuration(format!("Invalid configuration: {}", e)))?;

        let config = memory.config().clone();
        let describer = ImmixDescriber::new(memory.clone());

        Ok(Self {
            memory,
            gc: MarkRegion::new(describer, &config),
            state: CollectorState::Idle,
            cycle: 0,
            diagnostic: ImmixDiagnostics::default(),
            header_diagnostic: InflatedHeaderDiagnostics::default(),
            sink: None,
            bad_locations: FxHashSet::default(),
        })
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Number of completed sweeps
    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn diagnostic(&self) -> &ImmixDiagnostics {
        &self.diagnostic
    }

    pub fn header_diagnostic(&self) -> &InflatedHeaderDiagnostics {
        &self.header_diagnostic
    }

    pub fn mark_stack(&self) -> &MarkStack {
        self.gc.mark_stack()
    }

    pub fn engine(&self) -> &MarkRegion<ImmixDescriber> {
        &self.gc
    }

    /// Send diagnostics snapshots to `sink` after every sweep
    ///
    /// Only takes effect when `diagnostics_enabled` is set.
    pub fn set_diagnostics_sink(&mut self, sink: Arc<dyn DiagnosticsSink>) {
        self.sink = Some(sink);
    }

    // === Allocation ===

    /// Allocate a mature object of `bytes` directly in the region
    ///
    /// Returns `None` for sizes above the region's object limit. Growth
    /// past the collection threshold schedules a full collection but the
    /// allocation still succeeds.
    pub fn allocate(&mut self, bytes: usize) -> Option<Address> {
        if bytes > self.gc.allocator().max_object_size() {
            return None;
        }

        let allocation = self.gc.allocate(bytes);
        if allocation.collect_now {
            self.memory
                .schedule_full_collection("Immix region allocate object", None);
        }
        if allocation.address.is_null() {
            return None;
        }

        let addr = allocation.address;
        let mut object = ManagedObject::new(Zone::Mature, bytes);
        object.header.set_in_region();
        self.memory.objects().insert(addr, object);

        self.allocate_black(addr);
        Some(addr)
    }

    /// Allocate like [`allocate`](Self::allocate), reporting why it failed
    ///
    /// # Errors
    /// `ObjectTooLarge` above the region's object limit, `OutOfMemory` if
    /// the region could not provide the space.
    pub fn try_allocate(&mut self, bytes: usize) -> Result<Address> {
        let max = self.gc.allocator().max_object_size();
        if bytes > max {
            return Err(ImmixError::ObjectTooLarge {
                requested: bytes,
                max,
            });
        }
        self.allocate(bytes)
            .ok_or(ImmixError::OutOfMemory { requested: bytes })
    }

    /// Relocate `original` into the region
    ///
    /// The original is left forwarded to the copy. Returns `None` if the
    /// object is unknown, too large, or the region could not hold it. The
    /// copy is sized by the object itself; `bytes` only has to agree.
    pub fn move_object(&mut self, original: Address, bytes: usize) -> Option<Address> {
        if !self.memory.contains(original) {
            return None;
        }
        let size = self.gc.describer().size(original);
        if size > self.gc.allocator().max_object_size() {
            return None;
        }
        if bytes != size {
            log::debug!(
                "immix: move of {} requested {} bytes, object reports {}",
                original,
                bytes,
                size
            );
        }

        let copy = self.gc.copy_object(original);
        if copy.is_null() {
            return None;
        }

        self.gc.describer().set_forwarding(original, copy);
        self.allocate_black(copy);
        Some(copy)
    }

    // Objects born during a cycle survive it.
    fn allocate_black(&mut self, addr: Address) {
        if !self.memory.mature_gc_in_progress() {
            return;
        }

        let mark = self.memory.mark();
        let marked = self.memory.with_object_mut(addr, |o| {
            o.header.mark(mark);
            (o.size_in_bytes(), o.header.inflated_index())
        });
        let Some((size, inflated)) = marked else {
            return;
        };
        if let Some(index) = inflated {
            self.memory.mark_inflated_header(index, mark);
        }
        self.gc.mark_lines(addr, size);
    }

    // === Phases ===

    /// Start a cycle: rotate the mark generation and clear line marks
    pub fn clear_marks(&mut self) -> Result<()> {
        self.expect_state(
            &[CollectorState::Idle, CollectorState::Swept],
            "idle or swept",
        )?;

        let mark = self.memory.rotate_mark();
        self.memory.set_mature_gc_in_progress(true);
        self.gc.clear_marks();
        self.bad_locations.clear();
        self.state = CollectorState::MarksCleared;

        log::debug!("immix: cycle {} marks cleared, mark {}", self.cycle, mark);
        Ok(())
    }

    /// Clear marks and scan every root source
    pub fn collect_start(&mut self, data: &mut GcData<'_>) -> Result<()> {
        self.clear_marks()?;
        self.collect_scan(data)
    }

    /// Scan roots, thread roots, handles and global handle locations
    ///
    /// Moved objects are written back into the slot they were found in.
    pub fn collect_scan(&mut self, data: &mut GcData<'_>) -> Result<()> {
        self.expect_state(
            &[
                CollectorState::MarksCleared,
                CollectorState::Scanning,
                CollectorState::Draining,
            ],
            "marks-cleared, scanning or draining",
        )?;

        let timer = GcTimer::new();
        self.phase_start("scan");
        self.state = CollectorState::Scanning;
        self.scan_roots(data);
        self.phase_end("scan", &timer);
        Ok(())
    }

    /// Drain the mark stack to fixpoint
    ///
    /// Returns true if any object was traced.
    pub fn process_mark_stack(&mut self) -> bool {
        let work = self.gc.process_mark_stack();
        if self.state == CollectorState::Scanning {
            self.state = CollectorState::Draining;
        }
        work
    }

    /// Complete marking and clean everything that depends on liveness
    ///
    /// Rescans roots, traces the marked set, rescans data handles until no
    /// new work appears, then clears weak references, queues finalizers,
    /// drops dead locked objects and purges the remembered set.
    pub fn collect_finish(&mut self, data: &mut GcData<'_>) -> Result<()> {
        self.expect_state(
            &[
                CollectorState::MarksCleared,
                CollectorState::Scanning,
                CollectorState::Draining,
                CollectorState::Finishing,
            ],
            "marks-cleared, scanning, draining or finishing",
        )?;

        let timer = GcTimer::new();
        self.phase_start("finish");

        self.scan_roots(data);
        self.gc.process_mark_stack();

        for object in self.memory.swap_marked_set() {
            self.gc.saw_object(object);
        }

        // Data handles may reach objects only native code knows about.
        loop {
            for handle in handles_where(data, |h| h.in_use_p() && h.is_rdata()) {
                let object = handle.object();
                if !object.is_null() && self.memory.marked_p(object) {
                    self.gc.scan_object(object);
                }
            }
            if !self.gc.process_mark_stack() {
                break;
            }
        }

        self.clean_weakrefs(data);
        self.scan_finalizers();

        {
            let threads = data.thread_nexus().threads();
            for thread in threads.iter() {
                thread.clean_locked_objects(&self.memory);
            }
        }

        let mark = self.memory.mark();
        let purged = self.memory.unremember_objects(mark);
        log::debug!("immix: purged {} remembered objects", purged);

        self.state = CollectorState::Finishing;
        self.phase_end("finish", &timer);
        Ok(())
    }

    /// Reclaim unmarked lines and headers and restart the allocator
    pub fn sweep(&mut self) -> Result<()> {
        self.expect_state(&[CollectorState::Finishing], "finishing")?;

        let timer = GcTimer::new();
        self.phase_start("sweep");

        let mark = self.memory.mark();
        self.gc.copy_marks();
        self.header_diagnostic = self.memory.deallocate_inflated_headers(mark);
        self.gc.sweep_blocks();

        let (dead, young) = {
            let mut objects = self.memory.objects();
            (objects.sweep_region(mark), objects.sweep_young(mark))
        };
        log::debug!(
            "immix: swept {} region objects, {} young records",
            dead.len(),
            young
        );

        {
            let memory = Arc::clone(&self.memory);
            let _watch = StopWatch::new(&memory.metrics().immix_diagnostics_us);
            self.compute_diagnostics();
        }

        if self.memory.config().diagnostics_enabled {
            if let Some(sink) = &self.sink {
                sink.report(DiagnosticsSnapshot::Immix(self.diagnostic.clone()));
                sink.report(DiagnosticsSnapshot::InflatedHeaders(
                    self.header_diagnostic.clone(),
                ));
            }
        }

        self.memory.logger().log(GcEvent::Sweep {
            cycle: self.cycle,
            live_bytes: self.diagnostic.bytes,
            total_bytes: self.diagnostic.total_bytes,
            holes: self.diagnostic.holes,
        });

        let free_bytes = self
            .diagnostic
            .total_bytes
            .saturating_sub(self.diagnostic.bytes);
        self.gc.restart(self.diagnostic.percentage, free_bytes);

        self.memory.set_mature_gc_in_progress(false);
        self.state = CollectorState::Swept;
        self.phase_end("sweep", &timer);
        self.cycle += 1;
        Ok(())
    }

    /// Run a complete cycle
    pub fn collect(&mut self, data: &mut GcData<'_>) -> Result<()> {
        self.collect_start(data)?;
        self.process_mark_stack();
        self.collect_finish(data)?;
        self.sweep()
    }

    /// Run a complete cycle if one was scheduled
    ///
    /// Returns whether a cycle ran. Pending requests are kept when called
    /// in the middle of a cycle.
    pub fn collect_if_requested(&mut self, data: &mut GcData<'_>) -> Result<bool> {
        if !self.memory.collection_requested() {
            return Ok(false);
        }
        self.expect_state(
            &[CollectorState::Idle, CollectorState::Swept],
            "idle or swept",
        )?;

        let requests = self.memory.take_collection_requests();

        log::info!(
            "immix: running full collection for {} request(s): {}",
            requests.len(),
            requests.join(", ")
        );
        self.collect(data)?;
        Ok(true)
    }

    // === Queries ===

    /// Mark `addr` reachable; returns its new address if it moved
    pub fn saw_object(&mut self, addr: Address) -> Option<Address> {
        self.gc.saw_object(addr)
    }

    /// Repair a reference during a young-generation pass
    pub fn update_pointer(&self, addr: Address) -> Address {
        self.gc.describer().update_pointer(addr)
    }

    /// Whether `addr` lies on an allocated region line
    pub fn allocated_address(&self, addr: Address) -> bool {
        self.gc.allocated_address(addr)
    }

    /// Classify `addr` for heap verification
    pub fn validate_object(&self, addr: Address) -> ObjectPosition {
        if !self.gc.allocated_address(addr) {
            return ObjectPosition::Unknown;
        }

        match self.memory.with_object(addr, |o| o.header.in_region_p()) {
            Some(true) => ObjectPosition::InRegion,
            _ => ObjectPosition::InRegionCorruptHeader,
        }
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut diagnostics = IndexMap::new();

        diagnostics.insert("state".to_string(), self.state.to_string());
        diagnostics.insert("cycle_count".to_string(), self.cycle.to_string());
        diagnostics.insert("mark".to_string(), self.memory.mark().to_string());
        diagnostics.insert(
            "chunks".to_string(),
            self.gc.block_allocator().chunks().len().to_string(),
        );
        diagnostics.insert(
            "region_bytes".to_string(),
            self.gc.block_allocator().total_bytes().to_string(),
        );
        diagnostics.insert(
            "occupancy".to_string(),
            format!("{:.2}", self.diagnostic.percentage),
        );
        diagnostics.insert(
            "chunks_left".to_string(),
            self.gc.describer().chunks_left().to_string(),
        );
        diagnostics.insert(
            "collection_requested".to_string(),
            self.memory.collection_requested().to_string(),
        );

        diagnostics
    }

    // === Internals ===

    fn expect_state(&self, allowed: &[CollectorState], expected: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ImmixError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn scan_roots(&mut self, data: &mut GcData<'_>) {
        for root in data.roots().iter_mut() {
            if let Some(fwd) = self.gc.saw_object(*root) {
                *root = fwd;
            }
        }

        {
            let threads = data.thread_nexus().threads();
            for thread in threads.iter() {
                let mut roots = thread.roots();
                for root in roots.iter_mut() {
                    if let Some(fwd) = self.gc.saw_object(*root) {
                        *root = fwd;
                    }
                }
            }
        }

        for handle in handles_where(data, |h| h.in_use_p() && !h.weak_p()) {
            if let Some(fwd) = self.gc.saw_object(handle.object()) {
                handle.set_object(fwd);
            }
        }

        if let Some(globals) = data.global_handle_locations() {
            for (location, global) in globals.locations().iter().enumerate() {
                let Some(handle) = global.handle() else {
                    continue;
                };

                if !handle.valid_p() {
                    if self.bad_locations.insert(location) {
                        log::warn!(
                            "immix: skipping corrupt handle {} at global location {}",
                            handle.id(),
                            location
                        );
                        MemoryMetrics::increment(&self.memory.metrics().bad_handles);
                        self.memory.logger().log(GcEvent::BadHandle { location });
                    }
                    continue;
                }

                let object = handle.object();
                if object.is_null() {
                    continue;
                }
                if let Some(fwd) = self.gc.saw_object(object) {
                    handle.set_object(fwd);
                }
            }
        }
    }

    fn clean_weakrefs(&mut self, data: &GcData<'_>) {
        let mark = self.memory.mark();
        let weak_handles = handles_where(data, |h| h.in_use_p() && h.weak_p());

        let objects = self.memory.objects();
        let cleared = self
            .memory
            .weak_refs()
            .clean(|referent| weak_status(&objects, mark, referent));

        let mut handles_cleared = 0;
        for handle in weak_handles {
            let object = handle.object();
            if object.is_null() {
                continue;
            }
            match weak_status(&objects, mark, object) {
                WeakStatus::Live => {}
                WeakStatus::Moved(to) => handle.set_object(to),
                WeakStatus::Dead => {
                    handle.set_object(Address::null());
                    handles_cleared += 1;
                }
            }
        }
        drop(objects);

        self.memory.logger().log(GcEvent::WeakRefsCleared {
            cleared: cleared + handles_cleared,
        });
    }

    fn scan_finalizers(&mut self) {
        let finalizer = self.memory.finalizer().clone();
        let queued = {
            let mut list = finalizer.lock_list();
            let queued = list.gc_scan(&mut self.gc, &self.memory);
            self.gc.process_mark_stack();
            queued
        };
        finalizer.notify();

        if queued > 0 {
            self.memory
                .logger()
                .log(GcEvent::FinalizersQueued { queued });
        }
    }

    fn compute_diagnostics(&mut self) {
        let diagnostic = &mut self.diagnostic;
        diagnostic.reset_counts();

        let blocks = self.gc.block_allocator();
        diagnostic.chunks = blocks.chunks().len();
        for block in blocks.blocks() {
            diagnostic.holes += block.holes();
            diagnostic.objects += block.objects();
            diagnostic.bytes += block.object_bytes();
            diagnostic.total_bytes += BLOCK_SIZE;
        }

        diagnostic.percentage = if diagnostic.total_bytes == 0 {
            0.0
        } else {
            diagnostic.bytes as f64 / diagnostic.total_bytes as f64
        };
        diagnostic.collections += 1;
    }

    fn phase_start(&self, phase: &str) {
        self.memory.logger().log(GcEvent::PhaseStart {
            phase: phase.to_string(),
            cycle: self.cycle,
        });
    }

    fn phase_end(&self, phase: &str, timer: &GcTimer) {
        self.memory.logger().log(GcEvent::PhaseEnd {
            phase: phase.to_string(),
            duration_ms: timer.elapsed_ms(),
            cycle: self.cycle,
        });
    }
}

impl Tracer for ImmixCollector {
    fn saw_object(&mut self, addr: Address) -> Option<Address> {
        self.gc.saw_object(addr)
    }
}

fn handles_where(data: &GcData<'_>, keep: impl Fn(&Handle) -> bool) -> Vec<Arc<Handle>> {
    data.handles()
        .handles()
        .iter()
        .filter(|h| keep(h))
        .cloned()
        .collect()
}

fn weak_status(objects: &ObjectSpace, mark: u32, referent: Address) -> WeakStatus {
    let Some(object) = objects.get(referent) else {
        return WeakStatus::Dead;
    };

    match object.header.forward() {
        Some(to) => match objects.get(to) {
            Some(copy) if copy.header.marked_p(mark) => WeakStatus::Moved(to),
            _ => WeakStatus::Dead,
        },
        None if object.header.marked_p(mark) => WeakStatus::Live,
        None => WeakStatus::Dead,
    }
}
