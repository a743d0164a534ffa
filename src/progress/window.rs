//! Trailing-window aggregation of progress records.
//!
//! Everything here is pure: callers pass the records and "now", and get back
//! the numbers and lists the running-state render shows.

use super::record::ProgressRecord;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default cap for the merged resource list.
pub const DEFAULT_RESOURCE_CAP: usize = 8;
/// Default cap for the merged activity list.
pub const DEFAULT_ACTIVITY_CAP: usize = 6;

/// Aggregated view of the records inside one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    pub token_delta: u64,
    pub total_tokens: u64,
    pub resources: Vec<String>,
    pub activities: Vec<String>,
    /// Most recent non-empty activity detail in the window.
    pub last_detail: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Earliest timestamp still inside a window ending at `now`.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(window) {
        Ok(window) => now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC),
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}

/// Records whose timestamp lies in `[now - window, now]`, in input order.
pub fn records_in_window<'a>(
    records: impl IntoIterator<Item = &'a ProgressRecord>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<&'a ProgressRecord> {
    let start = window_start(now, window);
    records
        .into_iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= now)
        .collect()
}

/// Token growth between the first and last record.
///
/// A counter that went backwards (producer restart, reset) reports zero
/// rather than a bogus delta.
pub fn token_delta(first: u64, last: u64) -> u64 {
    last.checked_sub(first).unwrap_or(0)
}

/// Union of touched resources: trimmed, deduplicated, sorted, capped.
pub fn merge_resources(records: &[&ProgressRecord], cap: usize) -> Vec<String> {
    let merged: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.resources.iter())
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    merged.into_iter().take(cap).map(str::to_string).collect()
}

/// Union of distinct activity names: trimmed, deduplicated, sorted, capped.
pub fn merge_activities(records: &[&ProgressRecord], cap: usize) -> Vec<String> {
    let merged: BTreeSet<&str> = records
        .iter()
        .map(|r| r.activity.trim())
        .filter(|name| !name.is_empty())
        .collect();
    merged.into_iter().take(cap).map(str::to_string).collect()
}

/// Summarize the records inside the window, or `None` when it is empty.
pub fn summarize_window(
    records: &[&ProgressRecord],
    resource_cap: usize,
    activity_cap: usize,
) -> Option<WindowSummary> {
    let first = records.first()?;
    let last = records.last()?;
    let last_detail = records
        .iter()
        .rev()
        .map(|r| r.activity_detail.trim())
        .find(|detail| !detail.is_empty())
        .map(str::to_string);
    let last_activity = records
        .iter()
        .map(|r| r.last_activity)
        .max()
        .unwrap_or(last.timestamp);
    Some(WindowSummary {
        token_delta: token_delta(first.tokens_used, last.tokens_used),
        total_tokens: last.tokens_used,
        resources: merge_resources(records, resource_cap),
        activities: merge_activities(records, activity_cap),
        last_detail,
        last_activity,
    })
}
