//! GC Metrics - Export Metrics
//!
//! Counters the memory subsystem bumps while running, plus a registry that
//! receives diagnostics snapshots and exports the latest values to
//! monitoring systems (Prometheus text or JSON).

use super::diagnostics::{DiagnosticsSink, DiagnosticsSnapshot};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// MemoryMetrics - process-visible counters of the memory subsystem
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    /// Chunks appended to the region
    pub immix_chunks: AtomicU64,
    /// Full collections requested by inflated header growth
    pub headers_set: AtomicU64,
    /// Time spent computing region diagnostics
    pub immix_diagnostics_us: AtomicU64,
    /// Full collections requested for any reason
    pub full_collections_scheduled: AtomicU64,
    /// Corrupt handles skipped during root scans
    pub bad_handles: AtomicU64,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Copy the counters into a registry
    pub fn export(&self, registry: &MetricsRegistry) {
        let counters = [
            ("immix_chunks", &self.immix_chunks),
            ("headers_set", &self.headers_set),
            ("immix_diagnostics_us", &self.immix_diagnostics_us),
            ("full_collections_scheduled", &self.full_collections_scheduled),
            ("bad_handles", &self.bad_handles),
        ];
        for (name, counter) in counters {
            registry.add(name.to_string(), MetricValue::Counter(Self::read(counter)));
        }
    }
}

/// MetricsRegistry - metrics exporter
///
/// Keeps the latest value of every metric in insertion order.
pub struct MetricsRegistry {
    metrics: Mutex<IndexMap<String, MetricValue>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(IndexMap::new()),
        }
    }

    /// Add metric
    pub fn add(&self, name: String, value: MetricValue) {
        self.metrics.lock().insert(name, value);
    }

    /// Get metric
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.metrics.lock().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    /// Export to Prometheus format
    pub fn to_prometheus(&self) -> String {
        let metrics = self.metrics.lock();
        let mut output = String::new();

        for (name, value) in metrics.iter() {
            output.push_str(&format!("{} {}\n", name, value.as_f64()));
        }

        output
    }

    /// Export to JSON
    pub fn to_json(&self) -> String {
        let metrics = self.metrics.lock();
        let map: serde_json::Map<String, serde_json::Value> = metrics
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::json!(value.as_f64())))
            .collect();

        serde_json::Value::Object(map).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsSink for MetricsRegistry {
    fn report(&self, snapshot: DiagnosticsSnapshot) {
        match snapshot {
            DiagnosticsSnapshot::Immix(d) => {
                self.add("immix_chunks_total".into(), MetricValue::Gauge(d.chunks as f64));
                self.add("immix_holes".into(), MetricValue::Gauge(d.holes as f64));
                self.add("immix_objects".into(), MetricValue::Gauge(d.objects as f64));
                self.add("immix_bytes".into(), MetricValue::Gauge(d.bytes as f64));
                self.add("immix_total_bytes".into(), MetricValue::Gauge(d.total_bytes as f64));
                self.add("immix_percentage".into(), MetricValue::Gauge(d.percentage));
                self.add("immix_collections".into(), MetricValue::Counter(d.collections));
            }
            DiagnosticsSnapshot::InflatedHeaders(d) => {
                self.add("inflated_headers_objects".into(), MetricValue::Gauge(d.objects as f64));
                self.add("inflated_headers_bytes".into(), MetricValue::Gauge(d.bytes as f64));
                self.add("inflated_headers_free".into(), MetricValue::Gauge(d.free_slots as f64));
                self.add(
                    "inflated_headers_collections".into(),
                    MetricValue::Counter(d.collections),
                );
            }
        }
    }
}

/// Metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Counter(v) => *v as f64,
            MetricValue::Gauge(v) => *v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ImmixDiagnostics;

    #[test]
    fn test_registry_receives_snapshot() {
        let registry = MetricsRegistry::new();
        registry.report(DiagnosticsSnapshot::Immix(ImmixDiagnostics {
            chunks: 2,
            bytes: 512,
            total_bytes: 1024,
            percentage: 0.5,
            collections: 3,
            ..Default::default()
        }));

        assert_eq!(registry.get("immix_percentage"), Some(MetricValue::Gauge(0.5)));
        assert_eq!(registry.get("immix_collections"), Some(MetricValue::Counter(3)));
        assert!(registry.to_prometheus().contains("immix_bytes 512\n"));
    }

    #[test]
    fn test_counters_export_in_order() {
        let metrics = MemoryMetrics::new();
        MemoryMetrics::increment(&metrics.headers_set);

        let registry = MetricsRegistry::new();
        metrics.export(&registry);

        assert_eq!(registry.len(), 5);
        assert!(registry.to_prometheus().starts_with("immix_chunks 0\n"));

        let json: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(json["headers_set"], 1.0);
    }
}
