//! Runtime configuration for the settings host
//!
//! Resolution order for the data directory:
//! explicit override (CLI) > `AVATAR_SETTINGS_DIR` > platform data dir > `.`

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{Level, error};

use crate::constants::{autosave, logging, storage};

/// Settings resolved once at startup
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub autosave_delay: Duration,
    pub log_level: Level,
}

impl RuntimeConfig {
    /// Build from process environment, with an optional data directory override
    pub fn from_env(data_dir_override: Option<PathBuf>) -> Self {
        Self::from_lookup(data_dir_override, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment in production, a map in tests)
    pub fn from_lookup(
        data_dir_override: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let data_dir = data_dir_override
            .or_else(|| lookup(storage::DATA_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let autosave_delay = lookup(autosave::DELAY_ENV)
            .and_then(|raw| parse_millis(autosave::DELAY_ENV, &raw))
            .unwrap_or(autosave::QUIET_WINDOW);

        let log_level = log_level_from_lookup(&lookup);

        Self {
            data_dir,
            autosave_delay,
            log_level,
        }
    }

    pub fn settings_file(&self) -> PathBuf {
        settings_file_in(&self.data_dir)
    }
}

/// Max log level from `LOG_LEVEL`, resolvable before any subscriber exists
pub fn log_level_from_env() -> Level {
    log_level_from_lookup(|key| std::env::var(key).ok())
}

fn log_level_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Level {
    lookup(logging::LEVEL_ENV)
        .map(|raw| parse_level(&raw))
        .unwrap_or(Level::INFO)
}

pub fn settings_file_in(dir: &Path) -> PathBuf {
    dir.join(storage::FILENAME)
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(storage::APP_DIR);
    path
}

fn parse_millis(var: &str, raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .inspect_err(|e| error!(var = %var, value = %raw, error = ?e, "failed to parse env var, using default"))
        .ok()
        .map(Duration::from_millis)
}

fn parse_level(raw: &str) -> Level {
    match raw.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
