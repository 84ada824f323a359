//! Configuration loading for gather.
//!
//! The file lives at `~/.gather/config.toml` unless `GATHER_CONFIG` points
//! elsewhere. Raw TOML structs stay private here; loading resolves them into
//! [`GroupSettings`] and [`TraceLevel`] at the parse boundary, so a loaded
//! [`GatherConfig`] is always valid.
//!
//! ```toml
//! [group]
//! deadline_ms = 5000
//! long_threshold_ms = 250
//!
//! [trace]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

use gather_types::{GroupSettings, SettingsError, TraceLevel};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "GATHER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        source: SettingsError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    group: Option<RawGroup>,
    trace: Option<RawTrace>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGroup {
    /// Group-wide wait bound. Default: 30000.
    deadline_ms: Option<u64>,
    /// Successful units slower than this are listed in the report. Default: 1000.
    long_threshold_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTrace {
    #[serde(default)]
    level: TraceLevel,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatherConfig {
    settings: GroupSettings,
    trace_level: TraceLevel,
}

impl GatherConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from `path`. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let raw: RawConfig = match toml::from_str(&content) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config = Self::resolve(raw).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "Loaded config");
        Ok(Some(config))
    }

    fn resolve(raw: RawConfig) -> Result<Self, SettingsError> {
        let group = raw.group.unwrap_or_default();
        let defaults = GroupSettings::default();
        let deadline = group
            .deadline_ms
            .map_or(defaults.deadline(), Duration::from_millis);
        let long_threshold = group
            .long_threshold_ms
            .map_or(defaults.long_threshold(), Duration::from_millis);

        Ok(Self {
            settings: GroupSettings::new(deadline, long_threshold)?,
            trace_level: raw.trace.unwrap_or_default().level,
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub const fn settings(&self) -> GroupSettings {
        self.settings
    }

    #[must_use]
    pub const fn trace_level(&self) -> TraceLevel {
        self.trace_level
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".gather").join("config.toml"))
}
