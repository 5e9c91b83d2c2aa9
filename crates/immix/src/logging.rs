//! GC Logging and Tracing
//!
//! Structured event log for the mark-region collector, useful for:
//! - Debugging the phase protocol
//! - Observing growth and scheduling pressure
//! - Asserting on collector behaviour in tests
//!
//! Every event is forwarded to the `log` facade at its level. Events that
//! pass the configured level are also kept in memory and, when console
//! output is enabled, printed in human or JSON form.
//!
//! Log Levels:
//! - WARN: Skipped invalid state (corrupt handles)
//! - INFO: Sweeps, scheduled collections
//! - DEBUG: Phases, growth, reference processing

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for GC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// GC event types
#[derive(Debug, Clone, PartialEq)]
pub enum GcEvent {
    /// Collection phase started
    PhaseStart { phase: String, cycle: u64 },

    /// Collection phase completed
    PhaseEnd {
        phase: String,
        duration_ms: f64,
        cycle: u64,
    },

    /// Region swept
    Sweep {
        cycle: u64,
        live_bytes: usize,
        total_bytes: usize,
        holes: usize,
    },

    /// Inflated header table swept
    HeaderSweep { mark: u32, retained: usize },

    /// Region grew by one chunk
    ChunkAdded { chunks: usize },

    /// Full collection requested for later
    CollectionScheduled { reason: String },

    /// Corrupt handle skipped during root scan
    BadHandle { location: usize },

    /// Weak references cleared after marking
    WeakRefsCleared { cleared: usize },

    /// Unreachable objects queued for finalization
    FinalizersQueued { queued: usize },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Number of events kept in memory
    pub capacity: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            console: false,
            json: false,
            timestamps: true,
            capacity: 4096,
        }
    }
}

/// GC Logger - event recorder owned by one memory instance
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<VecDeque<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create new GC logger
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        let event_level = Self::event_level(&event);
        log::log!(event_level.as_log(), "{}", Self::describe(&event));

        if event_level > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.capacity {
            events.pop_front();
        }
        events.push_back((Instant::now(), event));
    }

    /// Get log level for event
    fn event_level(event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::BadHandle { .. } => LogLevel::Warn,
            GcEvent::Sweep { .. }
            | GcEvent::HeaderSweep { .. }
            | GcEvent::CollectionScheduled { .. } => LogLevel::Info,
            GcEvent::PhaseStart { .. }
            | GcEvent::PhaseEnd { .. }
            | GcEvent::ChunkAdded { .. }
            | GcEvent::WeakRefsCleared { .. }
            | GcEvent::FinalizersQueued { .. } => LogLevel::Debug,
        }
    }

    /// Output to console
    fn output_console(&self, event: &GcEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            if let Ok(json_str) = serde_json::to_string(&Self::to_json(event)) {
                println!("{}", json_str);
            }
        } else {
            println!("[GC] {}", Self::describe(event));
        }
    }

    /// Human-readable form
    fn describe(event: &GcEvent) -> String {
        match event {
            GcEvent::PhaseStart { phase, cycle } => {
                format!("Cycle {}: {} phase started", cycle, phase)
            },
            GcEvent::PhaseEnd {
                phase,
                duration_ms,
                cycle,
            } => format!(
                "Cycle {}: {} phase completed ({:.2}ms)",
                cycle, phase, duration_ms
            ),
            GcEvent::Sweep {
                cycle,
                live_bytes,
                total_bytes,
                holes,
            } => format!(
                "Cycle {}: region {}/{} bytes live, {} holes",
                cycle, live_bytes, total_bytes, holes
            ),
            GcEvent::HeaderSweep { mark, retained } => {
                format!("Inflated headers: {} retained at mark {}", retained, mark)
            },
            GcEvent::ChunkAdded { chunks } => format!("Region grew to {} chunks", chunks),
            GcEvent::CollectionScheduled { reason } => {
                format!("Full collection scheduled: {}", reason)
            },
            GcEvent::BadHandle { location } => format!(
                "Detected bad handle checking global capi handles (location {})",
                location
            ),
            GcEvent::WeakRefsCleared { cleared } => {
                format!("{} weak references cleared", cleared)
            },
            GcEvent::FinalizersQueued { queued } => {
                format!("{} objects queued for finalization", queued)
            },
        }
    }

    /// JSON form
    fn to_json(event: &GcEvent) -> serde_json::Value {
        match event {
            GcEvent::PhaseStart { phase, cycle } => serde_json::json!({
                "type": "phase_start",
                "cycle": cycle,
                "phase": phase
            }),
            GcEvent::PhaseEnd {
                phase,
                duration_ms,
                cycle,
            } => serde_json::json!({
                "type": "phase_end",
                "cycle": cycle,
                "phase": phase,
                "duration_ms": duration_ms
            }),
            GcEvent::Sweep {
                cycle,
                live_bytes,
                total_bytes,
                holes,
            } => serde_json::json!({
                "type": "sweep",
                "cycle": cycle,
                "live_bytes": live_bytes,
                "total_bytes": total_bytes,
                "holes": holes
            }),
            GcEvent::HeaderSweep { mark, retained } => serde_json::json!({
                "type": "header_sweep",
                "mark": mark,
                "retained": retained
            }),
            GcEvent::ChunkAdded { chunks } => serde_json::json!({
                "type": "chunk_added",
                "chunks": chunks
            }),
            GcEvent::CollectionScheduled { reason } => serde_json::json!({
                "type": "collection_scheduled",
                "reason": reason
            }),
            GcEvent::BadHandle { location } => serde_json::json!({
                "type": "bad_handle",
                "location": location
            }),
            GcEvent::WeakRefsCleared { cleared } => serde_json::json!({
                "type": "weakrefs_cleared",
                "cleared": cleared
            }),
            GcEvent::FinalizersQueued { queued } => serde_json::json!({
                "type": "finalizers_queued",
                "queued": queued
            }),
        }
    }

    /// Get all events
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events matching a predicate, oldest first
    pub fn find_events<F>(&self, mut predicate: F) -> Vec<GcEvent>
    where
        F: FnMut(&GcEvent) -> bool,
    {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| predicate(event))
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_logger_basic() {
        let logger = GcLogger::default();

        logger.log(GcEvent::CollectionScheduled {
            reason: "Inflated headers".to_string(),
        });

        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_gc_logger_disable() {
        let logger = GcLogger::default();

        logger.disable();
        logger.log(GcEvent::ChunkAdded { chunks: 2 });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_level_filter_drops_debug_events() {
        let logger = GcLogger::new(GcLoggerConfig {
            level: LogLevel::Info,
            ..Default::default()
        });

        logger.log(GcEvent::ChunkAdded { chunks: 2 });
        logger.log(GcEvent::BadHandle { location: 0 });

        assert_eq!(
            logger.find_events(|_| true),
            vec![GcEvent::BadHandle { location: 0 }]
        );
    }

    #[test]
    fn test_capacity_keeps_newest() {
        let logger = GcLogger::new(GcLoggerConfig {
            capacity: 2,
            ..Default::default()
        });

        for chunks in 1..=3 {
            logger.log(GcEvent::ChunkAdded { chunks });
        }

        let events = logger.find_events(|e| matches!(e, GcEvent::ChunkAdded { .. }));
        assert_eq!(
            events,
            vec![
                GcEvent::ChunkAdded { chunks: 2 },
                GcEvent::ChunkAdded { chunks: 3 }
            ]
        );
    }

    #[test]
    fn test_json_shape() {
        let json = GcLogger::to_json(&GcEvent::WeakRefsCleared { cleared: 4 });
        assert_eq!(json["type"], "weakrefs_cleared");
        assert_eq!(json["cleared"], 4);
    }
}
