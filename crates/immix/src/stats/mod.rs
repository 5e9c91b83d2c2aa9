//! Stats Module - Collector Diagnostics and Metrics
//!
//! - `diagnostics`: per-sweep snapshot records and the sink they go to
//! - `metrics`: process-visible counters and a Prometheus/JSON exporter
//! - `timer`: phase timing and the microsecond `StopWatch`

pub mod diagnostics;
pub mod metrics;
pub mod timer;

pub use diagnostics::{
    DiagnosticsSink, DiagnosticsSnapshot, ImmixDiagnostics, InflatedHeaderDiagnostics,
    RecordingSink,
};
pub use metrics::{MemoryMetrics, MetricValue, MetricsRegistry};
pub use timer::{GcTimer, StopWatch};
