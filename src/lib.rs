//! taskpulse: progress tracking and chat notification for background agent
//! tasks.
//!
//! A [`progress::ProgressListener`] consumes typed lifecycle signals for
//! tasks it did not start, keeps one live status message per task up to date
//! through a [`sink::MessageSink`], and guarantees each task's final status is
//! rendered exactly once, recovering lost completions by polling a
//! [`store::TaskStore`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskpulse::progress::{ListenerSettings, ProgressListener};
//! use taskpulse::signal::parse_wire_line;
//! use taskpulse::sink::{ChatTarget, ConsoleSink};
//! use taskpulse::types::SystemClock;
//!
//! # async fn example() {
//! let listener = ProgressListener::new(
//!     ListenerSettings::default(),
//!     ChatTarget::new("chat-1"),
//!     Arc::new(ConsoleSink::new()),
//!     None,
//!     Arc::new(SystemClock),
//! );
//! let line = r#"{"event":"background_task.dispatched","node_id":"bg-1"}"#;
//! if let Ok(Some(event)) = parse_wire_line(line) {
//!     listener.on_event(event).await;
//! }
//! listener.release().await;
//! listener.closed().await;
//! # }
//! ```

pub mod build_info;
pub mod config;
pub mod error;
pub mod progress;
pub mod signal;
pub mod sink;
pub mod store;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod types;
