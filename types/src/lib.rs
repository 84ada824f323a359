//! Core domain types for gather.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! the errors a job group reports, its validated settings, and the execution
//! trace it hands to a sink.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod settings;
mod trace;

pub use settings::{GroupSettings, SettingsError, TraceLevel};
pub use trace::{TraceLine, TraceReport};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Group errors
// ============================================================================

/// The group-wide deadline elapsed before every unit finished.
///
/// Recoverable: slots that did finish stay readable on the group, and the
/// outstanding units keep running in the background.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job group timed out after {deadline:?} with {} of {total} units outstanding", .outstanding.len())]
pub struct TimeoutError {
    deadline: Duration,
    total: usize,
    outstanding: Vec<usize>,
}

impl TimeoutError {
    #[must_use]
    pub fn new(deadline: Duration, total: usize, outstanding: Vec<usize>) -> Self {
        Self {
            deadline,
            total,
            outstanding,
        }
    }

    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Number of units dispatched by the run that timed out.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Submission indices that had not written their slot at the deadline.
    #[must_use]
    pub fn outstanding(&self) -> &[usize] {
        &self.outstanding
    }
}

/// No outcome is available for a slot: the index is out of range, or the
/// unit behind it has not finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("no outcome for slot {index}")]
pub struct NotFoundError {
    index: usize,
}

impl NotFoundError {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self { index }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

// ============================================================================
// Duration formatting
// ============================================================================

/// Compact human duration used in trace output (`850µs`, `12.3ms`, `1.25s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d < Duration::from_millis(1) {
            write!(f, "{}µs", d.as_micros())
        } else if d < Duration::from_secs(1) {
            write!(f, "{:.1}ms", d.as_secs_f64() * 1000.0)
        } else {
            write!(f, "{:.2}s", d.as_secs_f64())
        }
    }
}
