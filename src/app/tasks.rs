//! `taskpulse tasks` and `taskpulse prune`.

use super::{open_store, retention};
use chrono::{DateTime, SecondsFormat, Utc};
use taskpulse::config::StoreConfig;
use taskpulse::store::{TaskRecord, TaskStore};
use taskpulse::textutil::{non_empty, truncate_chars};
use tracing::info;

pub async fn list_tasks(
    config: &StoreConfig,
    chat_id: &str,
    active_only: bool,
    limit: usize,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.list_by_chat(chat_id, active_only, limit).await?;
    if records.is_empty() {
        println!("no tasks for chat {chat_id}");
        return Ok(());
    }
    for record in &records {
        println!("{}", task_line(record));
    }
    Ok(())
}

fn task_line(record: &TaskRecord) -> String {
    let mut line = format!(
        "{}  {:<13}  {:<12}  {}",
        record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.status.as_str(),
        non_empty(Some(record.agent_type.as_str()), "unknown"),
        record.task_id
    );
    if !record.description.is_empty() {
        line.push_str("  ");
        line.push_str(&truncate_chars(&record.description, 60));
    }
    if !record.error.is_empty() {
        line.push_str("  error=");
        line.push_str(&truncate_chars(&record.error, 80));
    }
    line
}

pub async fn prune(config: &StoreConfig, mark_stale: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if let Some(reason) = mark_stale.map(str::trim).filter(|r| !r.is_empty()) {
        let marked = store.mark_stale_running(reason).await?;
        info!(marked, "marked stale tasks failed");
        println!("marked {marked} stale task(s) failed");
    }
    let keep = chrono::Duration::from_std(retention(config)).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(keep)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let removed = store.delete_expired(cutoff).await?;
    info!(removed, "pruned expired tasks");
    println!("removed {removed} expired task(s)");
    Ok(())
}
