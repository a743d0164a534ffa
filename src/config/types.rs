//! Configuration data model.
//!
//! Struct/enum definitions plus their defaults. Every section is
//! `#[serde(default)]` so partial files only override what they name.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::{
    default_coding_agent_types, DEFAULT_ARGS_MAX_CHARS, DEFAULT_CODING_FLUSH_INTERVAL_SECS,
    DEFAULT_DESCRIPTION_MAX_CHARS, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_FLUSH_WINDOW_SECS,
    DEFAULT_INPUT_SUMMARY_MAX_CHARS, DEFAULT_IO_TIMEOUT_SECS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_LIFETIME_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RESULT_MAX_CHARS,
    DEFAULT_RETENTION_HOURS, DEFAULT_STORE_DIR,
};
use crate::progress::window::{DEFAULT_ACTIVITY_CAP, DEFAULT_RESOURCE_CAP};
use crate::store::DEFAULT_MAX_TASKS_PER_CHAT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub progress: ProgressConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// `[progress]`: listener cadence, timeouts and render bounds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProgressConfig {
    pub flush_interval_secs: u64,
    pub coding_flush_interval_secs: u64,
    /// Agent classifiers (case-insensitive) that use the coding cadence.
    pub coding_agent_types: Vec<String>,
    pub flush_window_secs: u64,
    pub poll_interval_secs: u64,
    pub max_lifetime_secs: u64,
    pub io_timeout_secs: u64,
    pub args_max_chars: usize,
    pub input_summary_max_chars: usize,
    pub result_max_chars: usize,
    pub description_max_chars: usize,
    pub resource_cap: usize,
    pub activity_cap: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            coding_flush_interval_secs: DEFAULT_CODING_FLUSH_INTERVAL_SECS,
            coding_agent_types: default_coding_agent_types(),
            flush_window_secs: DEFAULT_FLUSH_WINDOW_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_lifetime_secs: DEFAULT_MAX_LIFETIME_SECS,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            args_max_chars: DEFAULT_ARGS_MAX_CHARS,
            input_summary_max_chars: DEFAULT_INPUT_SUMMARY_MAX_CHARS,
            result_max_chars: DEFAULT_RESULT_MAX_CHARS,
            description_max_chars: DEFAULT_DESCRIPTION_MAX_CHARS,
            resource_cap: DEFAULT_RESOURCE_CAP,
            activity_cap: DEFAULT_ACTIVITY_CAP,
        }
    }
}

/// `[store]`: local task store location and eviction policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `tasks.json`. Blank keeps the store in memory.
    pub dir: String,
    pub retention_hours: u64,
    pub max_tasks_per_chat: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_STORE_DIR.to_string(),
            retention_hours: DEFAULT_RETENTION_HOURS,
            max_tasks_per_chat: DEFAULT_MAX_TASKS_PER_CHAT,
        }
    }
}

/// `[logging]`: tracing filter directive.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicit `--config` path.
    Explicit(PathBuf),
    /// `./taskpulse.toml`.
    Local,
    /// `$XDG_CONFIG_HOME/taskpulse/taskpulse.toml`.
    Global(PathBuf),
    /// No file found.
    BuiltInDefaults,
}

/// Configuration payload plus its source.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}
