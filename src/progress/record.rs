//! Immutable snapshot of one progress signal.

use chrono::{DateTime, Utc};

/// Tool name producers use for liveness pings. Never aggregated or rendered.
pub const HEARTBEAT_TOOL: &str = "__heartbeat__";

/// One progress observation for a tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub timestamp: DateTime<Utc>,
    /// Name of the tool or activity the agent is running, may be empty.
    pub activity: String,
    /// Bounded free-text detail (usually the tool arguments).
    pub activity_detail: String,
    /// Cumulative tokens consumed by the task so far.
    pub tokens_used: u64,
    /// Resources touched so far, in producer order, without blanks.
    pub resources: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

impl ProgressRecord {
    /// Record with only a timestamp; the remaining fields are empty.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            activity: String::new(),
            activity_detail: String::new(),
            tokens_used: 0,
            resources: Vec::new(),
            last_activity: timestamp,
        }
    }
}
