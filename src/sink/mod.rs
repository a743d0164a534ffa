//! Chat message sink contract.
//!
//! The listener only needs two platform operations: post a new message into a
//! conversation and overwrite an existing one in place. Platform adapters live
//! outside this crate; [`ConsoleSink`] is the local stand-in used by the CLI.

use crate::error::SinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Conversation the status messages are posted into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTarget {
    pub chat_id: String,
    /// Message the first status post replies to, when the platform threads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ChatTarget {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            reply_to: None,
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

/// Opaque handle to a message previously returned by [`MessageSink::send`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound chat operations consumed by the progress listener.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Post `text` as a new message and return its handle.
    async fn send(&self, target: &ChatTarget, text: &str) -> Result<MessageRef, SinkError>;

    /// Replace the content of an existing message.
    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), SinkError>;
}

/// Sink that prints every operation to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    next_id: AtomicU64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_block(&self, header: &str, text: &str) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{header}\n{text}\n")
            .map_err(|e| SinkError::Transport(format!("stdout: {e}")))
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn send(&self, target: &ChatTarget, text: &str) -> Result<MessageRef, SinkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = MessageRef(format!("msg-{id}"));
        let header = match target.reply_to.as_deref() {
            Some(parent) => format!("=== {message} -> {} (reply to {parent})", target.chat_id),
            None => format!("=== {message} -> {}", target.chat_id),
        };
        self.print_block(&header, text)?;
        Ok(message)
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), SinkError> {
        self.print_block(&format!("=== {message} (edited)"), text)
    }
}
