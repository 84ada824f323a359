//! Human-readable execution report for one job group run.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use crate::HumanDuration;

/// One notable event inside a run. Units that succeed quickly produce none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    /// The unit returned an error.
    Failed {
        index: usize,
        elapsed: Duration,
        error: String,
    },
    /// The unit succeeded but took longer than the long threshold.
    Slow { index: usize, elapsed: Duration },
    /// The unit had not finished when the deadline elapsed.
    TimedOut { index: usize },
}

impl TraceLine {
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Failed { index, .. } | Self::Slow { index, .. } | Self::TimedOut { index } => {
                *index
            }
        }
    }
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed {
                index,
                elapsed,
                error,
            } => write!(
                f,
                " -> Run {index} unit time: {}, Error: {error}",
                HumanDuration(*elapsed)
            ),
            Self::Slow { index, elapsed } => {
                write!(f, " -> Run {index} unit time: {}", HumanDuration(*elapsed))
            }
            Self::TimedOut { index } => write!(f, " -> Warning: Run {index} unit timeout"),
        }
    }
}

/// Consolidated summary of a run, handed to a trace sink once the run returns.
///
/// Lines are ordered by unit index within each kind: finished units first,
/// then timed-out ones.
///
/// The header names the call site from `#[track_caller]`, which carries file,
/// line and column but not the enclosing function. Groups that want a name in
/// the header set a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    caller: &'static Location<'static>,
    label: Option<String>,
    units: usize,
    lines: Vec<TraceLine>,
    total: Duration,
}

impl TraceReport {
    #[must_use]
    pub fn new(
        caller: &'static Location<'static>,
        units: usize,
        lines: Vec<TraceLine>,
        total: Duration,
    ) -> Self {
        Self {
            caller,
            label: None,
            units,
            lines,
            total,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Source location that started the run.
    #[must_use]
    pub const fn caller(&self) -> &'static Location<'static> {
        self.caller
    }

    #[must_use]
    pub const fn units(&self) -> usize {
        self.units
    }

    #[must_use]
    pub fn lines(&self) -> &[TraceLine] {
        &self.lines
    }

    /// Wall-clock time from dispatch to the run returning.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    pub fn timed_out(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().filter_map(|line| match line {
            TraceLine::TimedOut { index } => Some(*index),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().filter_map(|line| match line {
            TraceLine::Failed { index, .. } => Some(*index),
            _ => None,
        })
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Group] ")?;
        if let Some(label) = &self.label {
            write!(f, "{label} ")?;
        }
        writeln!(
            f,
            "{}:{}:{}, Start {} units ...",
            self.caller.file(),
            self.caller.line(),
            self.caller.column(),
            self.units
        )?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        write!(f, " -> Total time spent: {}", HumanDuration(self.total))
    }
}
