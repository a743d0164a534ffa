//! Status text rendering. No I/O and no locks: input is a tracker snapshot.

use super::tracker::{TaskIdentity, TrackerSnapshot};
use super::window::{records_in_window, summarize_window};
use crate::textutil::{non_empty, truncate_chars};
use crate::types::TaskStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;
use std::time::Duration;

/// Bounds applied while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub description_max_chars: usize,
    pub resource_cap: usize,
    pub activity_cap: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            description_max_chars: 120,
            resource_cap: super::window::DEFAULT_RESOURCE_CAP,
            activity_cap: super::window::DEFAULT_ACTIVITY_CAP,
        }
    }
}

/// Title line for a status.
pub fn title_for(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending | TaskStatus::Running => "[Background task in progress]",
        TaskStatus::WaitingInput => "[Background task waiting for input]",
        TaskStatus::Completed => "[Background task completed]",
        TaskStatus::Failed => "[Background task failed]",
        TaskStatus::Cancelled => "[Background task cancelled]",
    }
}

/// Whole minutes for labels: rounded up, never below one.
pub fn format_minutes(d: Duration) -> String {
    let mins = d.as_secs().div_ceil(60).max(1);
    format!("{mins}m")
}

/// Elapsed minutes since `started_at`, rounded, clamped at zero.
pub fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = now.signed_duration_since(started_at).num_seconds().max(0);
    (secs + 30) / 60
}

fn write_header(
    out: &mut String,
    identity: &TaskIdentity,
    title: &str,
    now: DateTime<Utc>,
    limits: &RenderLimits,
) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(
        out,
        "task_id={} agent={}",
        identity.task_id,
        non_empty(identity.agent_type.as_deref(), "unknown")
    );
    if let Some(desc) = identity.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "desc={}", truncate_chars(desc, limits.description_max_chars));
    }
    let _ = write!(out, "elapsed={}m", elapsed_minutes(identity.started_at, now));
}

/// First message posted when a task is dispatched.
pub fn render_started(
    identity: &TaskIdentity,
    interval: Duration,
    window: Duration,
    now: DateTime<Utc>,
    limits: &RenderLimits,
) -> String {
    let mut out = String::new();
    write_header(&mut out, identity, title_for(TaskStatus::Running), now, limits);
    let _ = write!(
        out,
        "\n\nStarted. Updates every {} until finished (last {} window).",
        format_minutes(interval),
        format_minutes(window)
    );
    out
}

/// Full status message for a snapshot.
pub fn render_status(snapshot: &TrackerSnapshot, now: DateTime<Utc>, limits: &RenderLimits) -> String {
    let mut out = String::new();
    write_header(
        &mut out,
        &snapshot.identity,
        title_for(snapshot.status),
        now,
        limits,
    );
    out.push('\n');

    match snapshot.status {
        TaskStatus::WaitingInput => {
            out.push_str("\nInput needed:\n");
            out.push_str(&snapshot.pending_result);
            out.push('\n');
        }
        status if status.is_terminal() => {
            out.push_str("\nResult:\n");
            out.push_str(&snapshot.pending_result);
            out.push('\n');
        }
        _ => write_running_body(&mut out, snapshot, now, limits),
    }

    out.trim_end_matches('\n').to_string()
}

fn write_running_body(
    out: &mut String,
    snapshot: &TrackerSnapshot,
    now: DateTime<Utc>,
    limits: &RenderLimits,
) {
    let in_window = records_in_window(&snapshot.recent, now, snapshot.window);
    let _ = writeln!(out, "\nLast {}:", format_minutes(snapshot.window));
    let summary = summarize_window(&in_window, limits.resource_cap, limits.activity_cap);
    match &summary {
        None => out.push_str("- no new progress\n"),
        Some(summary) => {
            if summary.total_tokens > 0 {
                let _ = writeln!(
                    out,
                    "- tokens: +{} / total {}",
                    summary.token_delta, summary.total_tokens
                );
            }
            if !summary.resources.is_empty() {
                let _ = writeln!(out, "- files: {}", summary.resources.join(", "));
            }
            if !summary.activities.is_empty() {
                let _ = writeln!(out, "- tools: {}", summary.activities.join(", "));
            }
            if let Some(detail) = &summary.last_detail {
                let _ = writeln!(out, "- last: {detail}");
            }
        }
    }
    // Outside the window, fall back to the last record seen at all.
    let last_activity = summary
        .map(|s| s.last_activity)
        .or_else(|| snapshot.last_progress.as_ref().map(|r| r.last_activity));

    out.push_str("\nCurrent:\n");
    if let Some(last) = &snapshot.last_progress {
        if !last.activity.is_empty() {
            if last.activity_detail.trim().is_empty() {
                let _ = writeln!(out, "- {}", last.activity);
            } else {
                let _ = writeln!(out, "- {}: {}", last.activity, last.activity_detail);
            }
        }
    }
    if let Some(at) = last_activity {
        let _ = writeln!(
            out,
            "- last_activity={}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
}
