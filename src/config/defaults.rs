//! Default configuration constants.
//!
//! Shared by the serde defaults and the listener settings so the literals live
//! in exactly one place.

/// Embedded `taskpulse.toml` template, identical to the built-in defaults.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/taskpulse.toml");

/// Status refresh cadence for running tasks.
pub(super) const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 10 * 60;
/// Refresh cadence for coding agents.
pub(super) const DEFAULT_CODING_FLUSH_INTERVAL_SECS: u64 = 3 * 60;
/// Trailing aggregation window.
pub(super) const DEFAULT_FLUSH_WINDOW_SECS: u64 = 10 * 60;
/// Completion poller cadence.
pub(super) const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Maximum lifetime of a released listener.
pub(super) const DEFAULT_MAX_LIFETIME_SECS: u64 = 4 * 60 * 60;
/// Bound for a single chat send/edit call.
pub(super) const DEFAULT_IO_TIMEOUT_SECS: u64 = 15;

pub(super) const DEFAULT_ARGS_MAX_CHARS: usize = 200;
pub(super) const DEFAULT_INPUT_SUMMARY_MAX_CHARS: usize = 400;
pub(super) const DEFAULT_RESULT_MAX_CHARS: usize = 1500;
pub(super) const DEFAULT_DESCRIPTION_MAX_CHARS: usize = 120;

/// Agent classifiers that get the coding cadence.
pub(super) fn default_coding_agent_types() -> Vec<String> {
    vec!["claude_code".to_string()]
}

/// Default local store directory.
pub(super) const DEFAULT_STORE_DIR: &str = ".taskpulse";
/// Default retention for terminal task records.
pub(super) const DEFAULT_RETENTION_HOURS: u64 = 7 * 24;
/// Default tracing filter when neither `RUST_LOG` nor `TASKPULSE_LOG` is set.
pub(super) const DEFAULT_LOG_FILTER: &str = "info";
