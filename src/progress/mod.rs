//! Background task progress tracking and notification.
//!
//! A [`ProgressListener`] is created per triggering request. It turns
//! dispatch/progress/completion signals into one live status message per
//! task, refreshes that message on a per-task timer, and finalizes each task
//! exactly once whether the completion arrives by push or by polling the
//! task store.

mod listener;
mod poller;
pub mod record;
pub mod render;
pub mod tracker;
pub mod window;

use std::time::Duration;
use tokio::sync::watch;

use crate::config::ProgressConfig;
use render::RenderLimits;

pub use listener::ProgressListener;
pub use record::ProgressRecord;
pub use tracker::{TaskIdentity, TaskTracker, TrackerSnapshot};
pub use window::WindowSummary;

/// Runtime projection of the `[progress]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub flush_interval: Duration,
    pub coding_flush_interval: Duration,
    /// Lowercased agent classifiers that use `coding_flush_interval`.
    pub coding_agent_types: Vec<String>,
    pub flush_window: Duration,
    pub poll_interval: Duration,
    pub max_lifetime: Duration,
    pub io_timeout: Duration,
    pub args_max_chars: usize,
    pub input_summary_max_chars: usize,
    pub result_max_chars: usize,
    pub render: RenderLimits,
}

impl ListenerSettings {
    pub fn from_config(config: &ProgressConfig) -> Self {
        let secs = |s: u64| Duration::from_secs(s.max(1));
        Self {
            flush_interval: secs(config.flush_interval_secs),
            coding_flush_interval: secs(config.coding_flush_interval_secs),
            coding_agent_types: config
                .coding_agent_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            flush_window: secs(config.flush_window_secs),
            poll_interval: secs(config.poll_interval_secs),
            max_lifetime: secs(config.max_lifetime_secs),
            io_timeout: secs(config.io_timeout_secs),
            args_max_chars: config.args_max_chars,
            input_summary_max_chars: config.input_summary_max_chars,
            result_max_chars: config.result_max_chars,
            render: RenderLimits {
                description_max_chars: config.description_max_chars,
                resource_cap: config.resource_cap,
                activity_cap: config.activity_cap,
            },
        }
    }

    /// Effective flush interval for a task's agent classifier.
    pub fn interval_for(&self, agent_type: Option<&str>) -> Duration {
        let is_coding = agent_type
            .map(|t| t.trim().to_ascii_lowercase())
            .is_some_and(|t| self.coding_agent_types.iter().any(|c| *c == t));
        if is_coding {
            self.flush_interval.min(self.coding_flush_interval)
        } else {
            self.flush_interval
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

/// Resolve once `rx` holds `true`, or once its sender is gone.
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await;
}
