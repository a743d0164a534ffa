//! Command orchestration for the taskpulse CLI.

pub mod logging;
mod replay;
mod tasks;

use crate::cli::Command;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use taskpulse::config::{store_dir, Config, StoreConfig};
use taskpulse::store::LocalTaskStore;

pub async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Replay {
            file,
            chat,
            reply_to,
            pace_ms,
        } => {
            replay::run_replay(
                config,
                replay::ReplayOptions {
                    file,
                    chat,
                    reply_to,
                    pace: Duration::from_millis(pace_ms),
                },
            )
            .await
        }
        Command::Tasks {
            chat,
            active,
            limit,
        } => tasks::list_tasks(&config.store, &chat, active, limit).await,
        Command::Prune { mark_stale } => {
            tasks::prune(&config.store, mark_stale.as_deref()).await
        }
    }
}

pub(crate) fn retention(config: &StoreConfig) -> Duration {
    Duration::from_secs(config.retention_hours.saturating_mul(60 * 60))
}

/// Open the configured store, in memory when no directory is set.
pub(crate) fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<LocalTaskStore>> {
    let retention = retention(config);
    let store = match store_dir(config) {
        Some(dir) => LocalTaskStore::open(&dir, retention, config.max_tasks_per_chat)
            .with_context(|| format!("opening task store at {}", dir.display()))?,
        None => LocalTaskStore::memory(retention, config.max_tasks_per_chat),
    };
    Ok(Arc::new(store))
}
