//! Resolved job group settings.
//!
//! Raw TOML deserialization structs stay private in `gather-config`; the
//! config loader resolves them into these types at the parse boundary.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("group deadline must be greater than zero")]
    ZeroDeadline,
}

/// Timing knobs for a job group.
///
/// Invariant: `deadline` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSettings {
    deadline: Duration,
    long_threshold: Duration,
}

impl GroupSettings {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
    pub const DEFAULT_LONG_THRESHOLD: Duration = Duration::from_secs(1);

    pub fn new(deadline: Duration, long_threshold: Duration) -> Result<Self, SettingsError> {
        if deadline.is_zero() {
            return Err(SettingsError::ZeroDeadline);
        }
        Ok(Self {
            deadline,
            long_threshold,
        })
    }

    /// How long a run waits for every unit before giving up.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Successful units slower than this still get a trace line.
    #[must_use]
    pub const fn long_threshold(&self) -> Duration {
        self.long_threshold
    }

    pub fn with_deadline(self, deadline: Duration) -> Result<Self, SettingsError> {
        Self::new(deadline, self.long_threshold)
    }

    #[must_use]
    pub const fn with_long_threshold(self, long_threshold: Duration) -> Self {
        Self {
            deadline: self.deadline,
            long_threshold,
        }
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            deadline: Self::DEFAULT_DEADLINE,
            long_threshold: Self::DEFAULT_LONG_THRESHOLD,
        }
    }
}

/// Verbosity at which execution reports are emitted.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Trace,
    Debug,
    Info,
    Warn,
    /// Reports are discarded.
    Off,
}

impl TraceLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = GroupSettings::default();
        assert_eq!(settings.deadline(), Duration::from_secs(30));
        assert_eq!(settings.long_threshold(), Duration::from_secs(1));
    }

    #[test]
    fn zero_deadline_is_rejected() {
        assert_eq!(
            GroupSettings::new(Duration::ZERO, Duration::from_secs(1)),
            Err(SettingsError::ZeroDeadline)
        );
        assert_eq!(
            GroupSettings::default().with_deadline(Duration::ZERO),
            Err(SettingsError::ZeroDeadline)
        );
    }

    #[test]
    fn with_long_threshold_keeps_deadline() {
        let settings = GroupSettings::default().with_long_threshold(Duration::from_millis(5));
        assert_eq!(settings.deadline(), GroupSettings::DEFAULT_DEADLINE);
        assert_eq!(settings.long_threshold(), Duration::from_millis(5));
    }

    #[test]
    fn trace_level_displays_its_config_spelling() {
        assert_eq!(TraceLevel::default().to_string(), "trace");
        assert_eq!(TraceLevel::Warn.to_string(), "warn");
        assert_eq!(TraceLevel::Off.as_str(), "off");
    }
}
