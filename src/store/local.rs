//! Memory/file-backed [`TaskStore`].
//!
//! File mode keeps one JSON document at `<dir>/tasks.json`, rewritten through
//! a temp file + rename on every mutation. The rewrite runs on the blocking
//! pool after the record lock is released; a separate async mutex keeps
//! rewrites in mutation order. Terminal records older than the
//! retention window are evicted, and each chat keeps at most
//! `max_tasks_per_chat` records (active ones are never evicted by the cap).

use super::{TaskRecord, TaskStore, TaskUpdate};
use crate::error::StoreError;
use crate::types::{Clock, SystemClock, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Default retention for terminal records.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default per-chat record cap.
pub const DEFAULT_MAX_TASKS_PER_CHAT: usize = 200;
/// File name used under the store directory.
const TASKS_FILE: &str = "tasks.json";

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskStoreDoc {
    tasks: Vec<TaskRecord>,
}

/// Local task store; in-memory when constructed without a directory.
pub struct LocalTaskStore {
    tasks: RwLock<HashMap<String, TaskRecord>>,
    /// Held from mutation until the file rewrite finishes.
    writing: AsyncMutex<()>,
    file_path: Option<PathBuf>,
    retention: chrono::Duration,
    max_tasks_per_chat: usize,
    clock: Arc<dyn Clock>,
}

impl LocalTaskStore {
    /// In-memory store. Zero values select the defaults.
    pub fn memory(retention: Duration, max_tasks_per_chat: usize) -> Self {
        Self::with_path(None, retention, max_tasks_per_chat)
    }

    /// File-backed store under `dir/tasks.json`, loading any existing file.
    pub fn open(
        dir: impl AsRef<Path>,
        retention: Duration,
        max_tasks_per_chat: usize,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(StoreError::Invalid("task store dir is required".to_string()));
        }
        fs::create_dir_all(dir)?;
        let store = Self::with_path(Some(dir.join(TASKS_FILE)), retention, max_tasks_per_chat);
        store.load()?;
        Ok(store)
    }

    /// Replace the clock used for timestamps and eviction.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn with_path(file_path: Option<PathBuf>, retention: Duration, max_tasks_per_chat: usize) -> Self {
        let retention = if retention.is_zero() {
            DEFAULT_RETENTION
        } else {
            retention
        };
        let max_tasks_per_chat = if max_tasks_per_chat == 0 {
            DEFAULT_MAX_TASKS_PER_CHAT
        } else {
            max_tasks_per_chat
        };
        Self {
            tasks: RwLock::new(HashMap::new()),
            writing: AsyncMutex::new(()),
            file_path,
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
            max_tasks_per_chat,
            clock: Arc::new(SystemClock),
        }
    }

    /// Remove every record created before `before`. Returns how many went.
    pub async fn delete_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.mutate(|tasks| {
            let start = tasks.len();
            tasks.retain(|_, rec| rec.created_at >= before);
            Some(start - tasks.len())
        })
        .await
        .map(Option::unwrap_or_default)
    }

    /// Fail every non-terminal record with `reason`, e.g. after a restart
    /// orphaned them. Returns how many were marked.
    pub async fn mark_stale_running(&self, reason: &str) -> Result<usize, StoreError> {
        let now = self.clock.now();
        self.mutate(|tasks| {
            let mut marked = 0;
            for rec in tasks.values_mut() {
                if rec.status.is_terminal() {
                    continue;
                }
                rec.status = TaskStatus::Failed;
                rec.error = reason.to_string();
                rec.updated_at = now;
                rec.completed_at = Some(now);
                marked += 1;
            }
            Some(marked)
        })
        .await
        .map(Option::unwrap_or_default)
    }

    /// Apply `change` under the record lock, then rewrite the file off the
    /// runtime. `change` returns `None` when nothing changed, which skips the
    /// rewrite.
    async fn mutate<R, F>(&self, change: F) -> Result<Option<R>, StoreError>
    where
        R: Send,
        F: FnOnce(&mut HashMap<String, TaskRecord>) -> Option<R> + Send,
    {
        let _writing = self.writing.lock().await;
        let (out, data) = {
            let mut tasks = self.tasks.write();
            let Some(out) = change(&mut *tasks) else {
                return Ok(None);
            };
            self.evict_locked(&mut tasks, self.clock.now());
            (out, self.encode_locked(&tasks)?)
        };
        if let (Some(path), Some(data)) = (self.file_path.clone(), data) {
            tokio::task::spawn_blocking(move || write_atomic(&path, &data))
                .await
                .map_err(|join| StoreError::Io(std::io::Error::other(join)))??;
        }
        Ok(Some(out))
    }

    fn evict_locked(&self, tasks: &mut HashMap<String, TaskRecord>, now: DateTime<Utc>) {
        tasks.retain(|_, rec| {
            if !rec.status.is_terminal() {
                return true;
            }
            let finished = rec.completed_at.unwrap_or(rec.updated_at);
            now.signed_duration_since(finished) <= self.retention
        });

        let mut by_chat: HashMap<&str, (Vec<&TaskRecord>, Vec<&TaskRecord>)> = HashMap::new();
        for rec in tasks.values() {
            let (active, terminal) = by_chat.entry(rec.chat_id.as_str()).or_default();
            if rec.status.is_terminal() {
                terminal.push(rec);
            } else {
                active.push(rec);
            }
        }

        let mut evict = HashSet::new();
        for (active, mut terminal) in by_chat.into_values() {
            if active.len() + terminal.len() <= self.max_tasks_per_chat {
                continue;
            }
            // Active records always stay; the newest terminal ones fill what is left.
            let allowance = self.max_tasks_per_chat.saturating_sub(active.len());
            terminal.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            evict.extend(terminal.into_iter().skip(allowance).map(|rec| rec.task_id.clone()));
        }
        tasks.retain(|id, _| !evict.contains(id));
    }

    fn load(&self) -> Result<(), StoreError> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let doc: TaskStoreDoc = serde_json::from_str(&raw)?;
        let mut tasks = self.tasks.write();
        for rec in doc.tasks {
            if rec.task_id.trim().is_empty() {
                continue;
            }
            tasks.insert(rec.task_id.clone(), rec);
        }
        self.evict_locked(&mut tasks, self.clock.now());
        Ok(())
    }

    /// Serialized document, or `None` for a memory store.
    fn encode_locked(
        &self,
        tasks: &HashMap<String, TaskRecord>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if self.file_path.is_none() {
            return Ok(None);
        }
        let mut doc = TaskStoreDoc {
            tasks: tasks.values().cloned().collect(),
        };
        doc.tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut data = serde_json::to_vec_pretty(&doc)?;
        data.push(b'\n');
        Ok(Some(data))
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    async fn save_task(&self, mut record: TaskRecord) -> Result<(), StoreError> {
        if record.task_id.trim().is_empty() || record.chat_id.trim().is_empty() {
            return Err(StoreError::Invalid("task_id and chat_id required".to_string()));
        }
        record.updated_at = record.updated_at.max(record.created_at);
        self.mutate(|tasks| {
            // Same rule as update_status: a late non-terminal save keeps an
            // existing terminal outcome.
            if !record.status.is_terminal()
                && tasks
                    .get(&record.task_id)
                    .is_some_and(|existing| existing.status.is_terminal())
            {
                return None;
            }
            tasks.insert(record.task_id.clone(), record);
            Some(())
        })
        .await
        .map(|_| ())
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<(), StoreError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(StoreError::Invalid("task_id required".to_string()));
        }
        let now = self.clock.now();
        self.mutate(|tasks| {
            let rec = tasks.get_mut(task_id)?;
            // A late non-terminal write must not hide a terminal status that
            // the completion poller relies on.
            if rec.status.is_terminal() && !status.is_terminal() {
                return None;
            }
            rec.status = status;
            rec.updated_at = now;
            if status.is_terminal() {
                rec.completed_at = Some(now);
            }
            if let Some(answer) = update.answer_preview {
                rec.answer_preview = answer;
            }
            if let Some(error) = update.error {
                rec.error = error;
            }
            if let Some(tokens) = update.tokens_used {
                rec.tokens_used = tokens;
            }
            Some(())
        })
        .await
        .map(|_| ())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Ok(None);
        }
        Ok(self.tasks.read().get(task_id).cloned())
    }

    async fn list_by_chat(
        &self,
        chat_id: &str,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 { 20 } else { limit };
        let mut out: Vec<TaskRecord> = self
            .tasks
            .read()
            .values()
            .filter(|rec| rec.chat_id == chat_id)
            .filter(|rec| !(active_only && rec.status.is_terminal()))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }
}
