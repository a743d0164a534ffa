//! Per-task tracker state and its stop/done signal pair.
//!
//! Mutable fields sit behind the tracker's own lock. The lock is never held
//! across an await and the tracker never calls back into the listener.

use super::record::ProgressRecord;
use super::window::window_start;
use crate::sink::MessageRef;
use crate::types::TaskStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;

/// Immutable identity of a tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentity {
    pub task_id: String,
    pub description: Option<String>,
    pub agent_type: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Fields copied out from under the lock for rendering.
#[derive(Debug, Clone)]
pub struct TrackerSnapshot {
    pub identity: TaskIdentity,
    pub status: TaskStatus,
    pub message: Option<MessageRef>,
    pub pending_result: String,
    pub last_progress: Option<ProgressRecord>,
    pub recent: Vec<ProgressRecord>,
    pub interval: Duration,
    pub window: Duration,
}

#[derive(Debug)]
struct TrackerState {
    status: TaskStatus,
    message: Option<MessageRef>,
    pending_result: String,
    last_progress: Option<ProgressRecord>,
    recent: VecDeque<ProgressRecord>,
}

/// Live state for one in-flight background task.
pub struct TaskTracker {
    identity: TaskIdentity,
    interval: Duration,
    window: Duration,
    state: Mutex<TrackerState>,
    stop_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    /// Held until the flush loop is spawned and takes ownership of it.
    done_tx: Mutex<Option<watch::Sender<bool>>>,
    /// Set once the dispatch save and started message have been delivered.
    announced_tx: watch::Sender<bool>,
}

impl TaskTracker {
    pub fn new(identity: TaskIdentity, interval: Duration, window: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (announced_tx, _) = watch::channel(false);
        Self {
            identity,
            interval,
            window,
            state: Mutex::new(TrackerState {
                status: TaskStatus::Running,
                message: None,
                pending_result: String::new(),
                last_progress: None,
                recent: VecDeque::new(),
            }),
            stop_tx,
            done_rx,
            done_tx: Mutex::new(Some(done_tx)),
            announced_tx,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.identity.task_id
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Previous cumulative token count, used when a signal omits it.
    pub fn last_tokens(&self) -> u64 {
        self.state
            .lock()
            .last_progress
            .as_ref()
            .map_or(0, |r| r.tokens_used)
    }

    /// Append a progress record and trim the window relative to `now`.
    ///
    /// Returns `None` when the tracker is terminal and the record was
    /// dropped. A tracker waiting for input resumes running.
    pub fn ingest(&self, record: ProgressRecord, now: DateTime<Utc>) -> Option<u64> {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return None;
        }
        if state.status == TaskStatus::WaitingInput {
            state.status = TaskStatus::Running;
            state.pending_result.clear();
        }
        let tokens = record.tokens_used;
        // Keep `recent` ascending even when producers deliver out of order.
        let at = state
            .recent
            .partition_point(|r| r.timestamp <= record.timestamp);
        state.recent.insert(at, record.clone());
        let cutoff = window_start(now, self.window);
        while state.recent.front().is_some_and(|r| r.timestamp < cutoff) {
            state.recent.pop_front();
        }
        state.last_progress = Some(record);
        Some(tokens)
    }

    /// Move to `waiting_input` with `summary` as the pending text. Returns
    /// false when the tracker is already terminal.
    pub fn request_input(&self, summary: String) -> bool {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::WaitingInput;
        state.pending_result = summary;
        true
    }

    /// Claim the terminal transition. Only the first caller gets `true`.
    pub fn finish(&self, status: TaskStatus, result: String) -> bool {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.pending_result = result;
        true
    }

    pub fn replace_message(&self, message: MessageRef) {
        self.state.lock().message = Some(message);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock();
        TrackerSnapshot {
            identity: self.identity.clone(),
            status: state.status,
            message: state.message.clone(),
            pending_result: state.pending_result.clone(),
            last_progress: state.last_progress.clone(),
            recent: state.recent.iter().cloned().collect(),
            interval: self.interval,
            window: self.window,
        }
    }

    /// Signals handed to the flush loop. `None` once taken, or when the
    /// tracker was stopped before its loop could start.
    pub fn take_loop_signals(&self) -> Option<(watch::Receiver<bool>, DoneGuard)> {
        let done = self.done_tx.lock().take()?;
        Some((self.stop_tx.subscribe(), DoneGuard(done)))
    }

    /// Stop the flush loop and wait until it has exited.
    ///
    /// Idempotent and safe to call from several tasks at once.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        // Loop never spawned: nothing to wait for.
        if let Some(done) = self.done_tx.lock().take() {
            done.send_replace(true);
        }
        let mut done_rx = self.done_rx.clone();
        // Err means the loop dropped its guard without reporting, i.e. it is gone.
        let _ = done_rx.wait_for(|done| *done).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// Guard held across the dispatch I/O. Dropping it, including when the
    /// dispatching future is cancelled, marks the tracker announced.
    pub fn announce_guard(&self) -> AnnounceGuard<'_> {
        AnnounceGuard(self)
    }

    pub fn is_announced(&self) -> bool {
        *self.announced_tx.borrow()
    }

    /// Wait until the dispatch I/O has finished. Renders that must land
    /// after the started message and store writes that must land after the
    /// initial save go through here.
    pub async fn announced(&self) {
        let mut rx = self.announced_tx.subscribe();
        let _ = rx.wait_for(|announced| *announced).await;
    }
}

pub struct AnnounceGuard<'a>(&'a TaskTracker);

impl Drop for AnnounceGuard<'_> {
    fn drop(&mut self) {
        self.0.announced_tx.send_replace(true);
    }
}

/// Marks the flush loop as exited when dropped, including on panic.
pub struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}
