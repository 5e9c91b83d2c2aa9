//! # Immix - Mark-Region Mature Collector
//!
//! A mature-generation garbage collector built on the Immix mark-region
//! design, together with the inflated header table that backs object
//! locks and identity hashes.
//!
//! ## Overview
//!
//! - **Mark-Region Space**: the region is carved into 32 KiB blocks of
//!   128-byte lines; liveness is tracked per line and new objects are
//!   bump-allocated into holes of unmarked lines
//! - **Generation Marks**: each cycle rotates a 32-bit mark number, so
//!   clearing marks never touches object headers
//! - **Promotion On Trace**: young objects reached by a full trace are
//!   copied into the region and forwarded
//! - **Inflated Headers**: side-table records for locks and identity
//!   hashes, reclaimed by the same mark generation
//! - **Deferred Scheduling**: growth and header pressure only request a
//!   full collection; nothing collects synchronously
//!
//! ## Quick Start
//!
//! ```rust
//! use immix::{ImmixCollector, ImmixConfig, Memory, RuntimeState};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), immix::ImmixError> {
//!     let memory = Arc::new(Memory::new(ImmixConfig::default()));
//!     let mut collector = ImmixCollector::new(memory.clone())?;
//!     let mut runtime = RuntimeState::new();
//!
//!     let kept = collector.allocate(128).expect("fits in a block");
//!     let dropped = collector.allocate(128).expect("fits in a block");
//!     runtime.roots.push(kept);
//!
//!     collector.collect(&mut runtime.gc_data())?;
//!
//!     assert!(memory.contains(kept));
//!     assert!(!memory.contains(dropped));
//!     Ok(())
//! }
//! ```
//!
//! ## Cycle Phases
//!
//! 1. **clear_marks**: rotate the mark generation, clear line marks
//! 2. **collect_scan**: scan roots, thread roots, handles, global handles
//! 3. **process_mark_stack**: trace to fixpoint
//! 4. **collect_finish**: marked set, data handles, weak references,
//!    finalizers, locked objects, remembered set purge
//! 5. **sweep**: reclaim lines and inflated headers, compute diagnostics,
//!    restart the allocator
//!
//! ## Modules
//!
//! - [`allocator`]: region allocator seam used by copies and allocations
//! - [`config`]: geometry constants, configuration and validation
//! - [`error`]: error types and the fatal invariant check
//! - [`gc`]: the collector and its phase protocol
//! - [`heap`]: blocks, chunks and the block allocator
//! - [`logging`]: structured collector events
//! - [`marker`]: generic mark-region engine, mark stack and roots
//! - [`memory`]: shared memory subsystem, remembered set, inflated headers
//! - [`object`]: object headers, the object store and weak references
//! - [`relocate`]: the object describer policy
//! - [`runtime`]: threads, handles and finalizers scanned by the collector
//! - [`stats`]: diagnostics records, metrics and timers
//! - [`util`]: alignment helpers

// Core collector modules
pub mod config;
pub mod error;
pub mod gc;

// Region management
pub mod allocator;
pub mod heap;
pub mod memory;
pub mod object;

// Tracing components
pub mod marker;
pub mod relocate;

// Runtime collaborators and monitoring
pub mod logging;
pub mod runtime;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use config::ImmixConfig;
pub use error::{ImmixError, Result};
pub use gc::{CollectorState, ImmixCollector, ObjectPosition};
pub use marker::{GcData, Roots, Tracer};
pub use memory::Memory;
pub use object::Address;
pub use runtime::RuntimeState;

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a collector over a fresh memory subsystem with default settings
///
/// # Examples
///
/// ```rust
/// let collector = immix::init()?;
/// assert_eq!(collector.cycle_count(), 0);
/// # Ok::<(), immix::ImmixError>(())
/// ```
pub fn init() -> Result<ImmixCollector> {
    init_with_config(ImmixConfig::default())
}

/// Create a collector over a fresh memory subsystem
///
/// # Errors
///
/// Returns `ImmixError::Configuration` if `config` does not validate.
pub fn init_with_config(config: ImmixConfig) -> Result<ImmixCollector> {
    ImmixCollector::new(std::sync::Arc::new(Memory::new(config)))
}
