//! GC Timer - Timing Utilities
//!
//! `GcTimer` measures phase durations for the event log; `StopWatch`
//! accumulates elapsed microseconds into a shared counter when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// GcTimer - timer for measuring GC operations
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Create new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped timer adding its lifetime, in microseconds, to a counter
pub struct StopWatch<'a> {
    counter: &'a AtomicU64,
    start: Instant,
}

impl<'a> StopWatch<'a> {
    pub fn new(counter: &'a AtomicU64) -> Self {
        Self {
            counter,
            start: Instant::now(),
        }
    }
}

impl Drop for StopWatch<'_> {
    fn drop(&mut self) {
        let us = self.start.elapsed().as_micros() as u64;
        self.counter.fetch_add(us, Ordering::Relaxed);
    }
}
