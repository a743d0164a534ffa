//! Background loops started by `release()`: the completion poller and the
//! max-lifetime watchdog. Both hold only a weak listener handle and exit once
//! the listener closes.

use super::listener::ProgressListener;
use super::signalled;
use crate::signal::Completion;
use crate::store::{TaskRecord, TaskStore};
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

pub(super) fn spawn_completion_poller(listener: &ProgressListener, store: Arc<dyn TaskStore>) {
    let weak = listener.downgrade();
    let mut closed_rx = listener.subscribe_closed();
    let period = listener.settings().poll_interval;
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = signalled(&mut closed_rx) => break,
                _ = ticker.tick() => {
                    let Some(listener) = weak.upgrade() else { break };
                    poll_once(&listener, store.as_ref()).await;
                }
            }
        }
    });
}

/// One poll cycle. Returns how many tasks were finalized from the store.
pub(super) async fn poll_once(listener: &ProgressListener, store: &dyn TaskStore) -> usize {
    let mut recovered = 0;
    for task_id in listener.tracked_task_ids() {
        match store.get_task(&task_id).await {
            Ok(Some(record)) if record.status.is_terminal() => {
                info!(task_id = %task_id, status = %record.status, "recovered completion from task store");
                if listener.finalize(completion_from_record(record)).await {
                    recovered += 1;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "task store poll failed; retrying next cycle");
            }
        }
    }
    recovered
}

fn completion_from_record(record: TaskRecord) -> Completion {
    let non_blank = |s: String| (!s.trim().is_empty()).then_some(s);
    Completion {
        task_id: record.task_id,
        status: Some(record.status.as_str().to_string()),
        answer: non_blank(record.answer_preview),
        error: non_blank(record.error),
        tokens_used: (record.tokens_used > 0).then_some(record.tokens_used),
    }
}

pub(super) fn spawn_watchdog(listener: &ProgressListener) {
    let weak = listener.downgrade();
    let mut closed_rx = listener.subscribe_closed();
    let lifetime = listener.settings().max_lifetime;
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = signalled(&mut closed_rx) => {}
            _ = time::sleep(lifetime) => {
                if let Some(listener) = weak.upgrade() {
                    warn!(
                        lifetime_secs = lifetime.as_secs(),
                        remaining = listener.tracked_task_ids().len(),
                        "listener max lifetime reached; force-closing"
                    );
                    listener.close().await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::progress::ListenerSettings;
    use crate::signal::{Dispatched, Signal};
    use crate::sink::ChatTarget;
    use crate::store::{LocalTaskStore, TaskUpdate};
    use crate::testsupport::{ManualClock, RecordingSink};
    use crate::types::TaskStatus;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl TaskStore for BrokenStore {
        async fn save_task(&self, _record: TaskRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn update_status(
            &self,
            _task_id: &str,
            _status: TaskStatus,
            _update: TaskUpdate,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn get_task(&self, _task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn list_by_chat(
            &self,
            _chat_id: &str,
            _active_only: bool,
            _limit: usize,
        ) -> Result<Vec<TaskRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn listener_with(store: Arc<dyn TaskStore>, sink: Arc<RecordingSink>) -> ProgressListener {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        ProgressListener::new(
            ListenerSettings::default(),
            ChatTarget::new("chat-1"),
            sink,
            Some(store),
            clock,
        )
    }

    fn dispatch(task_id: &str) -> Signal {
        Signal::Dispatched(Dispatched {
            task_id: task_id.to_string(),
            description: None,
            agent_type: Some("claude_code".to_string()),
            timestamp: None,
        })
    }

    #[tokio::test]
    async fn poll_finalizes_only_terminal_records() {
        let store = Arc::new(LocalTaskStore::memory(Duration::from_secs(3600), 10));
        let sink = Arc::new(RecordingSink::new());
        let listener = listener_with(store.clone(), sink.clone());
        listener.on_signal(dispatch("T1")).await;
        listener.on_signal(dispatch("T2")).await;

        store
            .update_status(
                "T2",
                TaskStatus::Failed,
                TaskUpdate::new().with_error("worker crashed"),
            )
            .await
            .expect("update");

        assert_eq!(poll_once(&listener, store.as_ref()).await, 1);
        assert_eq!(listener.tracked_task_ids(), vec!["T1"]);
        assert_eq!(sink.count_containing("[Background task failed]"), 1);
        assert!(sink.last_text().expect("text").contains("worker crashed"));

        assert_eq!(poll_once(&listener, store.as_ref()).await, 0);
        assert_eq!(sink.count_containing("[Background task failed]"), 1);
        listener.close().await;
    }

    #[tokio::test]
    async fn poll_read_failure_skips_task() {
        let sink = Arc::new(RecordingSink::new());
        let store: Arc<dyn TaskStore> = Arc::new(BrokenStore);
        let listener = listener_with(store.clone(), sink.clone());
        listener.on_signal(dispatch("T1")).await;
        assert_eq!(listener.tracked_task_ids(), vec!["T1"]);
        assert_eq!(poll_once(&listener, store.as_ref()).await, 0);
        assert_eq!(listener.tracked_task_ids(), vec!["T1"]);
        listener.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_force_closes_after_max_lifetime() {
        let sink = Arc::new(RecordingSink::new());
        let store: Arc<dyn TaskStore> = Arc::new(BrokenStore);
        let listener = listener_with(store, sink);
        listener.on_signal(dispatch("T1")).await;
        listener.release().await;
        assert!(!listener.is_closed());

        time::timeout(Duration::from_secs(5 * 60 * 60), listener.closed())
            .await
            .expect("watchdog closes the listener");
        assert!(listener.is_closed());
        assert!(listener.tracked_task_ids().is_empty());
    }

    #[test]
    fn completion_from_record_drops_blank_fields() {
        let mut record = TaskRecord::new(
            "chat-1",
            "T9",
            TaskStatus::Cancelled,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        );
        record.answer_preview = "  ".to_string();
        let completion = completion_from_record(record);
        assert_eq!(completion.status.as_deref(), Some("cancelled"));
        assert_eq!(completion.answer, None);
        assert_eq!(completion.tokens_used, None);
    }
}
