//! `taskpulse replay`: drive a listener from JSON-line signals.

use super::open_store;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskpulse::config::Config;
use taskpulse::progress::{ListenerSettings, ProgressListener};
use taskpulse::signal::parse_wire_line;
use taskpulse::sink::{ChatTarget, ConsoleSink};
use taskpulse::store::TaskStore;
use taskpulse::types::SystemClock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub struct ReplayOptions {
    pub file: Option<PathBuf>,
    pub chat: String,
    pub reply_to: Option<String>,
    pub pace: Duration,
}

pub async fn run_replay(config: &Config, options: ReplayOptions) -> anyhow::Result<()> {
    let store = open_store(&config.store)?;
    let mut target = ChatTarget::new(options.chat);
    if let Some(reply_to) = options.reply_to {
        target = target.replying_to(reply_to);
    }
    let listener = ProgressListener::new(
        ListenerSettings::from_config(&config.progress),
        target,
        Arc::new(ConsoleSink::new()),
        Some(store as Arc<dyn TaskStore>),
        Arc::new(SystemClock),
    );

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &options.file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    tokio::select! {
        fed = feed_lines(&listener, reader, options.pace) => fed?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; closing listener");
            listener.close().await;
            return Ok(());
        }
    }

    listener.release().await;
    if !listener.is_closed() {
        info!(
            pending = listener.tracked_task_ids().len(),
            "input drained; waiting for outstanding tasks (Ctrl-C to stop)"
        );
    }
    tokio::select! {
        _ = listener.closed() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; closing listener");
            listener.close().await;
        }
    }
    Ok(())
}

async fn feed_lines(
    listener: &ProgressListener,
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    pace: Duration,
) -> anyhow::Result<()> {
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;
    while let Some(line) = lines.next_line().await.context("reading signals")? {
        line_no += 1;
        match parse_wire_line(&line) {
            Ok(Some(event)) => listener.on_event(event).await,
            Ok(None) => debug!(line_no, "line carried no signal"),
            Err(err) => warn!(line_no, error = %err, "malformed signal line skipped"),
        }
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
    Ok(())
}
