//! Shared test fixtures for store/listener/config test modules.
//!
//! Small reusable helpers so each test module does not rebuild its own temp
//! dir, fake clock or fake chat sink.

use crate::error::SinkError;
use crate::sink::{ChatTarget, MessageRef, MessageSink};
use crate::types::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("taskpulse-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    /// Root directory path for this fixture.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a child path under the fixture root.
    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Clock that only moves when a test advances it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// One call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Send {
        target: ChatTarget,
        message: MessageRef,
        text: String,
    },
    Edit {
        message: MessageRef,
        text: String,
    },
}

impl SinkCall {
    pub fn text(&self) -> &str {
        match self {
            Self::Send { text, .. } | Self::Edit { text, .. } => text,
        }
    }
}

/// In-memory sink recording successful sends and edits.
///
/// Failing operations are not recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    next_id: AtomicU64,
    fail_edits: AtomicBool,
    fail_sends: AtomicBool,
    send_delay: Mutex<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every edit, as platforms do for some message kinds.
    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Hold every send for `delay` before it is recorded.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn sends(&self) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Send { .. }))
            .collect()
    }

    pub fn edits(&self) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Edit { .. }))
            .collect()
    }

    /// Text of the most recent successful call.
    pub fn last_text(&self) -> Option<String> {
        self.calls.lock().last().map(|c| c.text().to_string())
    }

    /// Number of recorded calls whose text contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.text().contains(needle))
            .count()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, target: &ChatTarget, text: &str) -> Result<MessageRef, SinkError> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("send disabled".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = MessageRef(format!("m{id}"));
        self.calls.lock().push(SinkCall::Send {
            target: target.clone(),
            message: message.clone(),
            text: text.to_string(),
        });
        Ok(message)
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), SinkError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("edit not allowed".to_string()));
        }
        self.calls.lock().push(SinkCall::Edit {
            message: message.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}
