//! Durable task record contract.
//!
//! The listener writes task status here on dispatch, progress and completion,
//! and the completion poller reads it back to recover terminal states whose
//! push signal never arrived. [`LocalTaskStore`] is the bundled memory/file
//! implementation.

use crate::error::StoreError;
use crate::types::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod local;

pub use local::{LocalTaskStore, DEFAULT_MAX_TASKS_PER_CHAT, DEFAULT_RETENTION};

/// One durable background-task record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub chat_id: String,
    pub task_id: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub answer_preview: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub tokens_used: u64,
}

impl TaskRecord {
    /// Build a fresh record stamped with `now` for both timestamps.
    pub fn new(
        chat_id: impl Into<String>,
        task_id: impl Into<String>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            task_id: task_id.into(),
            agent_type: String::new(),
            description: String::new(),
            status,
            created_at: now,
            updated_at: now,
            completed_at: None,
            answer_preview: String::new(),
            error: String::new(),
            tokens_used: 0,
        }
    }
}

/// Optional fields applied alongside a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub answer_preview: Option<String>,
    pub error: Option<String>,
    pub tokens_used: Option<u64>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer_preview(mut self, answer: impl Into<String>) -> Self {
        self.answer_preview = Some(answer.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }
}

/// Read/write contract for durable task status.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a record. A non-terminal record does not replace a
    /// terminal one.
    async fn save_task(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Change a record's status and apply optional fields. Unknown ids are a
    /// no-op.
    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<(), StoreError>;

    /// Load one record by id.
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Records for one chat, newest first.
    async fn list_by_chat(
        &self,
        chat_id: &str,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError>;
}
