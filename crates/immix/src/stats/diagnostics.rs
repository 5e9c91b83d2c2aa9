//! Diagnostics records
//!
//! Plain counter snapshots recomputed by the collector during `sweep` and by
//! the inflated header table during `deallocate_headers`. They are handed to
//! a sink by value; nothing inside the collector reads them back except the
//! occupancy ratio driving the allocator restart.

use parking_lot::Mutex;
use serde::Serialize;

/// Region occupancy after a sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImmixDiagnostics {
    pub chunks: usize,
    pub holes: usize,
    pub objects: usize,
    pub bytes: usize,
    pub total_bytes: usize,
    pub percentage: f64,
    pub collections: u64,
}

impl ImmixDiagnostics {
    /// Reset the per-sweep counters, keeping the cumulative collection count
    pub fn reset_counts(&mut self) {
        *self = Self {
            collections: self.collections,
            ..Default::default()
        };
    }
}

/// Inflated header table usage after a header sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InflatedHeaderDiagnostics {
    pub objects: usize,
    pub bytes: usize,
    pub free_slots: usize,
    pub collections: u64,
}

/// One report handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticsSnapshot {
    Immix(ImmixDiagnostics),
    InflatedHeaders(InflatedHeaderDiagnostics),
}

/// Receiver of diagnostics snapshots
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, snapshot: DiagnosticsSnapshot);
}

/// Sink that keeps every snapshot it receives
#[derive(Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<DiagnosticsSnapshot>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<DiagnosticsSnapshot> {
        self.snapshots.lock().clone()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, snapshot: DiagnosticsSnapshot) {
        self.snapshots.lock().push(snapshot);
    }
}
