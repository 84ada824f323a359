//! Destinations for run reports.

use std::sync::{Mutex, PoisonError};

use gather_types::{TraceLevel, TraceReport};

/// Receives one consolidated report per run.
///
/// Called on the task that awaited the run, after the wait has finished.
pub trait TraceSink: Send + Sync {
    fn report(&self, report: &TraceReport);
}

/// Emits reports as `tracing` events under the `gather::trace` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    level: TraceLevel,
}

impl TracingSink {
    #[must_use]
    pub const fn new(level: TraceLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub const fn level(&self) -> TraceLevel {
        self.level
    }
}

impl TraceSink for TracingSink {
    fn report(&self, report: &TraceReport) {
        let units = report.units();
        let total_ms = report.total().as_millis() as u64;
        match self.level {
            TraceLevel::Trace => {
                tracing::trace!(target: "gather::trace", units, total_ms, "{report}");
            }
            TraceLevel::Debug => {
                tracing::debug!(target: "gather::trace", units, total_ms, "{report}");
            }
            TraceLevel::Info => {
                tracing::info!(target: "gather::trace", units, total_ms, "{report}");
            }
            TraceLevel::Warn => {
                tracing::warn!(target: "gather::trace", units, total_ms, "{report}");
            }
            TraceLevel::Off => {}
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<TraceReport>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reports(&self) -> Vec<TraceReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<TraceReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl TraceSink for MemorySink {
    fn report(&self, report: &TraceReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn report(&self, _report: &TraceReport) {}
}
