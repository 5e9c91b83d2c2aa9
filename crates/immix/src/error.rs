//! Error Module - Immix Error Types
//!
//! Defines the error type returned by the fallible parts of the collector.
//!
//! # Error Categories
//!
//! Most failure in this crate is deliberately *not* an error value:
//!
//! - Transient allocation pressure is a `collect_now` flag and a deferred
//!   collection request.
//! - A corrupt handle or unexpected null seen while scanning is logged and
//!   skipped.
//! - Allocation exhaustion is a `None` address.
//! - Inflated header index exhaustion is a deliberate panic (see [`bug`]).
//!
//! What remains are caller mistakes: driving the collection phases out of
//! order, asking the object store about an address it does not hold, or
//! handing the collector an invalid configuration.

use crate::object::Address;
use thiserror::Error;

/// Main error type for all Immix operations
///
/// # Examples
///
/// ```rust
/// use immix::ImmixError;
///
/// fn handle_error(err: ImmixError) {
///     match err {
///         ImmixError::InvalidState { expected, actual } => {
///             eprintln!("phase called in {} (expected {})", actual, expected);
///         }
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum ImmixError {
    /// A collection phase was invoked out of order
    ///
    /// **When returned:** e.g. `sweep` before `collect_finish`
    ///
    /// **Recovery strategy:** Cannot recover - the caller's phase driver is broken
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Configuration error
    ///
    /// **When returned:** `ImmixConfig::validate` rejected the configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument
    ///
    /// **When returned:** Function argument fails validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The object store holds no object at this address
    ///
    /// **When returned:** Field access or header inflation on a dead or
    /// never-allocated address
    #[error("No managed object at {address}")]
    UnknownObject { address: Address },

    /// Object is larger than a region block can hold
    ///
    /// **Recovery strategy:** Allocate from a large-object space instead
    #[error("Object too large for region: requested {requested} bytes, max {max} bytes")]
    ObjectTooLarge { requested: usize, max: usize },

    /// Region could not satisfy an allocation
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Internal error - indicates a bug in the collector
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImmixError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ImmixError::OutOfMemory { .. } | ImmixError::ObjectTooLarge { .. }
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            ImmixError::InvalidState { .. } | ImmixError::Internal(_)
        )
    }
}

/// Result type alias for Immix operations
pub type Result<T> = std::result::Result<T, ImmixError>;

/// Abort on a broken runtime invariant.
///
/// Used where continuing would silently corrupt the heap, e.g. when the
/// inflated header index space is exhausted. This is intentionally not an
/// error value.
#[cold]
#[track_caller]
pub fn bug(message: &str) -> ! {
    log::error!("{}", message);
    panic!("bug: {}", message);
}
