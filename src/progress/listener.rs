//! Listener registry, signal dispatch, flush delivery and close state machine.
//!
//! Two lock domains: the registry mutex guards membership plus the
//! `closed`/`released` flags, and every tracker guards its own fields. Neither
//! is held across an await.

use super::poller::{spawn_completion_poller, spawn_watchdog};
use super::record::{ProgressRecord, HEARTBEAT_TOOL};
use super::render::{render_started, render_status};
use super::tracker::{TaskIdentity, TaskTracker};
use super::{signalled, ListenerSettings};
use crate::error::SinkError;
use crate::signal::{Completion, Dispatched, InputRequested, ListenerEvent, Progress, Signal};
use crate::sink::{ChatTarget, MessageRef, MessageSink};
use crate::store::{TaskRecord, TaskStore, TaskUpdate};
use crate::textutil::truncate_chars;
use crate::types::{Clock, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const DEFAULT_INPUT_SUMMARY: &str = "The agent is waiting for your input.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKind {
    /// Timer-driven refresh; skipped once the task is terminal.
    Tick,
    /// Immediate refresh for input requests and the final render.
    Forced,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<String, Arc<TaskTracker>>,
    closed: bool,
    released: bool,
}

pub(super) struct Shared {
    settings: ListenerSettings,
    target: ChatTarget,
    sink: Arc<dyn MessageSink>,
    store: Option<Arc<dyn TaskStore>>,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
    closed_tx: watch::Sender<bool>,
}

/// Event sink for one triggering request's background tasks.
///
/// Cloning is cheap and every clone drives the same registry.
#[derive(Clone)]
pub struct ProgressListener {
    shared: Arc<Shared>,
}

/// Non-owning handle held by background loops.
#[derive(Clone)]
pub(super) struct WeakListener(Weak<Shared>);

impl WeakListener {
    pub(super) fn upgrade(&self) -> Option<ProgressListener> {
        self.0.upgrade().map(|shared| ProgressListener { shared })
    }
}

impl ProgressListener {
    pub fn new(
        settings: ListenerSettings,
        target: ChatTarget,
        sink: Arc<dyn MessageSink>,
        store: Option<Arc<dyn TaskStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                settings,
                target,
                sink,
                store,
                clock,
                registry: Mutex::new(Registry::default()),
                closed_tx,
            }),
        }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.shared.settings
    }

    pub(super) fn downgrade(&self) -> WeakListener {
        WeakListener(Arc::downgrade(&self.shared))
    }

    pub(super) fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.shared.closed_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Inbound signals
    // -----------------------------------------------------------------------

    /// Entry point for both producer adapters.
    pub async fn on_event(&self, event: ListenerEvent) {
        match event {
            ListenerEvent::Envelope(signal) => self.on_signal(signal).await,
            ListenerEvent::DirectCompletion(completion) => {
                self.finalize(completion).await;
            }
        }
    }

    pub async fn on_signal(&self, signal: Signal) {
        match signal {
            Signal::Dispatched(d) => self.on_dispatched(d).await,
            Signal::Progress(p) => self.on_progress(p).await,
            Signal::InputRequested(i) => self.on_input_requested(i).await,
            Signal::Completed(c) => {
                self.finalize(c).await;
            }
        }
    }

    async fn on_dispatched(&self, signal: Dispatched) {
        let now = self.shared.clock.now();
        let interval = self.shared.settings.interval_for(signal.agent_type.as_deref());
        let identity = TaskIdentity {
            task_id: signal.task_id,
            description: signal.description,
            agent_type: signal.agent_type,
            started_at: signal.timestamp.unwrap_or(now),
        };
        let tracker = {
            let mut registry = self.shared.registry.lock();
            if registry.closed || registry.released {
                debug!(task_id = %identity.task_id, "dispatch after release dropped");
                return;
            }
            if registry.tasks.contains_key(&identity.task_id) {
                debug!(task_id = %identity.task_id, "duplicate dispatch ignored");
                return;
            }
            let tracker = Arc::new(TaskTracker::new(
                identity,
                interval,
                self.shared.settings.flush_window,
            ));
            registry
                .tasks
                .insert(tracker.task_id().to_string(), tracker.clone());
            tracker
        };
        info!(
            task_id = %tracker.task_id(),
            interval_secs = interval.as_secs(),
            "tracking background task"
        );

        // Completions and input requests arriving during this I/O wait on the
        // guard, so their render edits the started message and their store
        // write lands after the initial save.
        let announcing = tracker.announce_guard();
        self.store_save(&tracker).await;

        let text = render_started(
            tracker.identity(),
            tracker.interval(),
            tracker.window(),
            now,
            &self.shared.settings.render,
        );
        match self.send_bounded(text).await {
            Ok(message) => tracker.replace_message(message),
            // The next flush sends a fresh message instead of editing.
            Err(err) => warn!(task_id = %tracker.task_id(), error = %err, "initial status send failed"),
        }
        drop(announcing);

        self.spawn_flush_loop(tracker);
    }

    async fn on_progress(&self, signal: Progress) {
        let Some(tracker) = self.lookup(&signal.task_id) else {
            debug!(task_id = %signal.task_id, "progress for untracked task dropped");
            return;
        };
        if signal.current_tool.as_deref() == Some(HEARTBEAT_TOOL) {
            return;
        }
        let now = self.shared.clock.now();
        let timestamp = signal.timestamp.unwrap_or(now);
        let record = ProgressRecord {
            timestamp,
            activity: signal.current_tool.unwrap_or_default(),
            activity_detail: signal
                .current_args
                .map(|a| truncate_chars(&a, self.shared.settings.args_max_chars))
                .unwrap_or_default(),
            tokens_used: signal
                .tokens_used
                .unwrap_or_else(|| tracker.last_tokens()),
            resources: signal.files_touched,
            last_activity: signal.last_activity.unwrap_or(timestamp),
        };
        let Some(tokens) = tracker.ingest(record, now) else {
            debug!(task_id = %signal.task_id, "progress for finished task dropped");
            return;
        };
        self.store_update(
            &signal.task_id,
            TaskStatus::Running,
            TaskUpdate::new().with_tokens_used(tokens),
        )
        .await;
    }

    async fn on_input_requested(&self, signal: InputRequested) {
        let Some(tracker) = self.lookup(&signal.task_id) else {
            debug!(task_id = %signal.task_id, "input request for untracked task dropped");
            return;
        };
        let summary = signal
            .summary
            .as_deref()
            .map(|s| truncate_chars(s, self.shared.settings.input_summary_max_chars))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INPUT_SUMMARY.to_string());
        if !tracker.request_input(summary) {
            debug!(task_id = %signal.task_id, "input request for finished task dropped");
            return;
        }
        info!(task_id = %signal.task_id, "background task waiting for input");
        tracker.announced().await;
        self.store_update(&signal.task_id, TaskStatus::WaitingInput, TaskUpdate::new())
            .await;
        self.flush(&tracker, FlushKind::Forced).await;
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Finalize a task exactly once.
    ///
    /// Shared by the direct, envelope and poll paths. Returns `false` when the
    /// task is unknown or another path already finalized it.
    pub async fn finalize(&self, completion: Completion) -> bool {
        let Some(tracker) = self.lookup(&completion.task_id) else {
            debug!(task_id = %completion.task_id, "completion for untracked task ignored");
            return false;
        };
        let status = TaskStatus::terminal_from_signal(completion.status.as_deref());
        let answer = clean_text(completion.answer.as_deref());
        let error = clean_text(completion.error.as_deref());
        let result = error
            .or(answer)
            .map(|text| truncate_chars(text, self.shared.settings.result_max_chars))
            .unwrap_or_else(|| format!("Task {status}."));
        if !tracker.finish(status, result) {
            debug!(task_id = %completion.task_id, "completion already claimed");
            return false;
        }
        info!(task_id = %completion.task_id, status = %status, "finalizing background task");

        tracker.announced().await;
        self.flush(&tracker, FlushKind::Forced).await;

        let mut update = TaskUpdate::new();
        if let Some(answer) = answer {
            update = update.with_answer_preview(truncate_chars(
                answer,
                self.shared.settings.result_max_chars,
            ));
        }
        if let Some(error) = error {
            update = update.with_error(truncate_chars(error, self.shared.settings.result_max_chars));
        }
        let tokens = completion.tokens_used.unwrap_or_else(|| tracker.last_tokens());
        update = update.with_tokens_used(tokens);
        self.store_update(&completion.task_id, status, update).await;

        let should_close = {
            let mut registry = self.shared.registry.lock();
            if registry
                .tasks
                .get(&completion.task_id)
                .is_some_and(|t| Arc::ptr_eq(t, &tracker))
            {
                registry.tasks.remove(&completion.task_id);
            }
            registry.released && registry.tasks.is_empty() && !registry.closed
        };
        tracker.stop().await;
        if should_close {
            self.close().await;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Release / close
    // -----------------------------------------------------------------------

    /// Declare that no further dispatch signals will arrive.
    ///
    /// With no tracked tasks the listener is closed before this returns.
    /// Otherwise the completion poller (when a store is configured) and the
    /// max-lifetime watchdog are started.
    pub async fn release(&self) {
        let pending = {
            let mut registry = self.shared.registry.lock();
            if registry.closed || registry.released {
                return;
            }
            registry.released = true;
            registry.tasks.len()
        };
        if pending == 0 {
            info!("listener released with no tasks");
            self.close().await;
            return;
        }
        info!(pending, "listener released; waiting for outstanding tasks");
        if let Some(store) = self.shared.store.clone() {
            spawn_completion_poller(self, store);
        }
        spawn_watchdog(self);
    }

    /// Close the listener and stop every remaining flush loop without a
    /// final render. Idempotent.
    pub async fn close(&self) {
        let remaining: Vec<Arc<TaskTracker>> = {
            let mut registry = self.shared.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            registry.tasks.drain().map(|(_, tracker)| tracker).collect()
        };
        if !remaining.is_empty() {
            info!(remaining = remaining.len(), "closing listener with tasks still tracked");
        }
        for tracker in &remaining {
            tracker.stop().await;
        }
        self.shared.closed_tx.send_replace(true);
        debug!("listener closed");
    }

    /// Resolves once the listener has closed.
    pub async fn closed(&self) {
        let mut rx = self.subscribe_closed();
        signalled(&mut rx).await;
    }

    pub fn is_closed(&self) -> bool {
        self.shared.registry.lock().closed
    }

    pub fn is_released(&self) -> bool {
        self.shared.registry.lock().released
    }

    /// Currently tracked task ids, sorted.
    pub fn tracked_task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.registry.lock().tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lookup(&self, task_id: &str) -> Option<Arc<TaskTracker>> {
        self.shared.registry.lock().tasks.get(task_id).cloned()
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    fn spawn_flush_loop(&self, tracker: Arc<TaskTracker>) {
        // `None` when close() already stopped this tracker.
        let Some((mut stop_rx, guard)) = tracker.take_loop_signals() else {
            return;
        };
        let weak = self.downgrade();
        tokio::spawn(async move {
            let _guard = guard;
            let period = tracker.interval();
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = signalled(&mut stop_rx) => break,
                    _ = ticker.tick() => {
                        let Some(listener) = weak.upgrade() else { break };
                        listener.flush(&tracker, FlushKind::Tick).await;
                    }
                }
            }
        });
    }

    /// Render the tracker and deliver it, editing in place when possible.
    async fn flush(&self, tracker: &TaskTracker, kind: FlushKind) -> bool {
        let snapshot = tracker.snapshot();
        if kind == FlushKind::Tick && snapshot.status.is_terminal() {
            return false;
        }
        let now = self.shared.clock.now();
        let text = render_status(&snapshot, now, &self.shared.settings.render);

        if let Some(message) = snapshot.message {
            match self.edit_bounded(message, text.clone()).await {
                Ok(()) => return true,
                Err(err) => {
                    debug!(task_id = %tracker.task_id(), error = %err, "status edit failed; sending new message");
                }
            }
        }
        match self.send_bounded(text).await {
            Ok(message) => {
                tracker.replace_message(message);
                true
            }
            Err(err) => {
                warn!(task_id = %tracker.task_id(), error = %err, "status flush abandoned this cycle");
                false
            }
        }
    }

    async fn send_bounded(&self, text: String) -> Result<MessageRef, SinkError> {
        let sink = self.shared.sink.clone();
        let target = self.shared.target.clone();
        self.bounded(async move { sink.send(&target, &text).await })
            .await
    }

    async fn edit_bounded(&self, message: MessageRef, text: String) -> Result<(), SinkError> {
        let sink = self.shared.sink.clone();
        self.bounded(async move { sink.edit(&message, &text).await })
            .await
    }

    /// Run a sink call on its own task so it outlives a cancelled caller,
    /// bounded by the configured I/O timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, SinkError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, SinkError>> + Send + 'static,
    {
        let limit = self.shared.settings.io_timeout;
        let mut handle = tokio::spawn(call);
        match time::timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(SinkError::Transport(format!("sink task failed: {join}"))),
            Err(_) => {
                handle.abort();
                Err(SinkError::Timeout(limit))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store sync (best-effort)
    // -----------------------------------------------------------------------

    async fn store_save(&self, tracker: &TaskTracker) {
        let Some(store) = &self.shared.store else {
            return;
        };
        let identity = tracker.identity();
        let mut record = TaskRecord::new(
            self.shared.target.chat_id.clone(),
            identity.task_id.clone(),
            TaskStatus::Running,
            identity.started_at,
        );
        record.agent_type = identity.agent_type.clone().unwrap_or_default();
        record.description = identity.description.clone().unwrap_or_default();
        if let Err(err) = store.save_task(record).await {
            warn!(task_id = %identity.task_id, error = %err, "task store save failed");
        }
    }

    async fn store_update(&self, task_id: &str, status: TaskStatus, update: TaskUpdate) {
        let Some(store) = &self.shared.store else {
            return;
        };
        if let Err(err) = store.update_status(task_id, status, update).await {
            warn!(task_id, status = %status, error = %err, "task store update failed");
        }
    }
}

fn clean_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::LocalTaskStore;
    use crate::testsupport::{ManualClock, RecordingSink, SinkCall};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        listener: ProgressListener,
        sink: Arc<RecordingSink>,
        store: Arc<LocalTaskStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(
            LocalTaskStore::memory(Duration::from_secs(3600), 50).with_clock(clock.clone()),
        );
        let listener = ProgressListener::new(
            ListenerSettings::default(),
            ChatTarget::new("chat-1").replying_to("user-msg"),
            sink.clone(),
            Some(store.clone() as Arc<dyn TaskStore>),
            clock.clone(),
        );
        Fixture {
            listener,
            sink,
            store,
            clock,
        }
    }

    /// Memory store whose initial saves are slow.
    struct SlowSaveStore {
        inner: LocalTaskStore,
        delay: Duration,
    }

    #[async_trait]
    impl TaskStore for SlowSaveStore {
        async fn save_task(&self, record: TaskRecord) -> Result<(), StoreError> {
            time::sleep(self.delay).await;
            self.inner.save_task(record).await
        }

        async fn update_status(
            &self,
            task_id: &str,
            status: TaskStatus,
            update: TaskUpdate,
        ) -> Result<(), StoreError> {
            self.inner.update_status(task_id, status, update).await
        }

        async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
            self.inner.get_task(task_id).await
        }

        async fn list_by_chat(
            &self,
            chat_id: &str,
            active_only: bool,
            limit: usize,
        ) -> Result<Vec<TaskRecord>, StoreError> {
            self.inner.list_by_chat(chat_id, active_only, limit).await
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    /// Dispatch on its own task, then complete while its I/O is in flight.
    async fn complete_during_dispatch(listener: &ProgressListener) {
        let dispatching = tokio::spawn({
            let listener = listener.clone();
            async move { listener.on_signal(dispatch("T1", "codex")).await }
        });
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(listener.tracked_task_ids(), vec!["T1"]);
        assert!(listener.finalize(completion("T1", "completed", "done")).await);
        dispatching.await.expect("dispatch task");
    }

    fn assert_started_then_completed(sink: &RecordingSink) {
        let calls = sink.calls();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert!(
            matches!(&calls[0], SinkCall::Send { message, text, .. }
                if message.as_str() == "m1" && text.contains("[Background task in progress]")),
            "{calls:?}"
        );
        assert!(
            matches!(&calls[1], SinkCall::Edit { message, text }
                if message.as_str() == "m1" && text.contains("[Background task completed]")),
            "{calls:?}"
        );
    }

    fn dispatch(task_id: &str, agent: &str) -> Signal {
        Signal::Dispatched(Dispatched {
            task_id: task_id.to_string(),
            description: Some("Fix the flaky test".to_string()),
            agent_type: Some(agent.to_string()),
            timestamp: None,
        })
    }

    fn progress(task_id: &str, tokens: Option<u64>, tool: &str) -> Signal {
        Signal::Progress(Progress {
            task_id: task_id.to_string(),
            current_tool: Some(tool.to_string()),
            tokens_used: tokens,
            ..Progress::default()
        })
    }

    fn completion(task_id: &str, status: &str, answer: &str) -> Completion {
        Completion {
            task_id: task_id.to_string(),
            status: Some(status.to_string()),
            answer: Some(answer.to_string()),
            ..Completion::default()
        }
    }

    #[tokio::test]
    async fn dispatch_sends_started_message_and_persists_record() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;

        let sends = f.sink.sends();
        assert_eq!(sends.len(), 1);
        let SinkCall::Send { target, text, .. } = &sends[0] else {
            panic!("expected send");
        };
        assert_eq!(target.reply_to.as_deref(), Some("user-msg"));
        assert!(text.contains("Updates every 10m"));
        let record = f.store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.chat_id, "chat-1");
        assert_eq!(record.agent_type, "codex");
        f.listener.close().await;
    }

    #[tokio::test]
    async fn duplicate_dispatch_is_ignored() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.on_signal(dispatch("T1", "codex")).await;
        assert_eq!(f.sink.sends().len(), 1);
        assert_eq!(f.listener.tracked_task_ids(), vec!["T1"]);
        f.listener.close().await;
    }

    #[tokio::test]
    async fn progress_without_tokens_carries_previous_count() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.on_signal(progress("T1", Some(100), "Read")).await;
        f.listener.on_signal(progress("T1", None, "Edit")).await;
        let record = f.store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.tokens_used, 100);
        f.listener.close().await;
    }

    #[tokio::test]
    async fn heartbeat_progress_is_not_ingested() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.on_signal(progress("T1", Some(5), HEARTBEAT_TOOL)).await;
        let tracker = f.listener.lookup("T1").expect("tracker");
        assert!(tracker.snapshot().last_progress.is_none());
        f.listener.close().await;
    }

    #[tokio::test]
    async fn input_request_forces_flush_with_summary() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener
            .on_signal(Signal::InputRequested(InputRequested {
                task_id: "T1".to_string(),
                summary: Some("Approve the migration?".to_string()),
            }))
            .await;
        let edits = f.sink.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].text().contains("waiting for input"));
        assert!(edits[0].text().contains("Approve the migration?"));
        let record = f.store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::WaitingInput);
        f.listener.close().await;
    }

    #[tokio::test]
    async fn finalize_prefers_error_text_and_is_idempotent() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        let failed = Completion {
            error: Some("compile error".to_string()),
            ..completion("T1", "error", "partial answer")
        };
        assert!(f.listener.finalize(failed.clone()).await);
        assert!(!f.listener.finalize(failed).await);

        assert_eq!(f.sink.count_containing("[Background task failed]"), 1);
        assert!(f.sink.last_text().expect("text").contains("compile error"));
        assert!(f.listener.tracked_task_ids().is_empty());
        let record = f.store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error, "compile error");
        assert_eq!(record.answer_preview, "partial answer");
    }

    #[tokio::test]
    async fn edit_failure_falls_back_to_new_message() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.sink.set_fail_edits(true);
        f.listener.finalize(completion("T1", "completed", "done")).await;
        let sends = f.sink.sends();
        assert_eq!(sends.len(), 2);
        assert!(sends[1].text().contains("Result:\ndone"));
    }

    #[tokio::test]
    async fn failed_initial_send_still_tracks_and_later_flush_sends() {
        let f = fixture();
        f.sink.set_fail_sends(true);
        f.listener.on_signal(dispatch("T1", "codex")).await;
        assert_eq!(f.listener.tracked_task_ids(), vec!["T1"]);
        f.sink.set_fail_sends(false);
        f.listener.finalize(completion("T1", "", "ok")).await;
        let calls = f.sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], SinkCall::Send { text, .. } if text.contains("completed")));
    }

    #[tokio::test]
    async fn release_with_no_tasks_closes_immediately() {
        let f = fixture();
        f.listener.release().await;
        assert!(f.listener.is_closed());
        f.listener.closed().await;
    }

    #[tokio::test]
    async fn dispatch_after_release_is_dropped() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.release().await;
        f.listener.on_signal(dispatch("T2", "codex")).await;
        assert_eq!(f.listener.tracked_task_ids(), vec!["T1"]);
        f.listener.close().await;
    }

    #[tokio::test]
    async fn last_finalize_after_release_closes_listener() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.on_signal(dispatch("T2", "claude_code")).await;
        f.listener.release().await;
        assert!(f.listener.is_released());

        f.listener.finalize(completion("T1", "completed", "a")).await;
        assert!(!f.listener.is_closed());
        f.listener
            .on_event(ListenerEvent::DirectCompletion(completion("T2", "cancelled", "")))
            .await;
        assert!(f.listener.is_closed());
        f.listener.closed().await;
    }

    #[tokio::test]
    async fn close_stops_trackers_without_final_render() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        let tracker = f.listener.lookup("T1").expect("tracker");
        f.listener.close().await;
        f.listener.close().await;
        assert!(tracker.is_stopped());
        assert_eq!(f.sink.calls().len(), 1);
        assert!(!f.listener.finalize(completion("T1", "completed", "late")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_during_slow_started_send_edits_that_message() {
        let f = fixture();
        f.sink.set_send_delay(Duration::from_secs(2));
        complete_during_dispatch(&f.listener).await;

        assert_started_then_completed(&f.sink);
        let record = f.store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_during_slow_initial_save_stays_terminal_in_store() {
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(SlowSaveStore {
            inner: LocalTaskStore::memory(Duration::from_secs(3600), 50),
            delay: Duration::from_secs(2),
        });
        let listener = ProgressListener::new(
            ListenerSettings::default(),
            ChatTarget::new("chat-1"),
            sink.clone(),
            Some(store.clone() as Arc<dyn TaskStore>),
            Arc::new(ManualClock::new(t0())),
        );
        complete_during_dispatch(&listener).await;

        assert_started_then_completed(&sink);
        let record = store.get_task("T1").await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.answer_preview, "done");
        assert!(listener.tracked_task_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_tracker_flushes_no_more_after_stop_returns() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        let tracker = f.listener.lookup("T1").expect("tracker");
        time::sleep(Duration::from_secs(601)).await;
        settle().await;
        assert_eq!(f.sink.edits().len(), 1);

        tracker.stop().await;
        assert!(tracker.is_stopped());
        time::sleep(Duration::from_secs(1800)).await;
        settle().await;
        assert_eq!(f.sink.edits().len(), 1);
        f.listener.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn finalized_and_closed_tasks_stay_quiet_past_their_interval() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        f.listener.on_signal(dispatch("T2", "claude_code")).await;
        f.listener.finalize(completion("T1", "completed", "done")).await;
        f.listener.close().await;
        let before = f.sink.calls();

        time::sleep(Duration::from_secs(1800)).await;
        settle().await;
        assert_eq!(f.sink.calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_flush_renders_window_summary() {
        let f = fixture();
        f.listener.on_signal(dispatch("T1", "codex")).await;
        for tokens in [100, 150, 220] {
            f.clock.advance(Duration::from_secs(60));
            f.listener.on_signal(progress("T1", Some(tokens), "Bash")).await;
        }
        f.clock.advance(Duration::from_secs(60));
        time::sleep(Duration::from_secs(601)).await;
        // Let the flush loop finish its edit.
        settle().await;
        let edits = f.sink.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].text().contains("tokens: +120 / total 220"));
        f.listener.close().await;
    }
}
