//! Error types for the collaborators and the config layer.
//!
//! None of these are fatal to the listener: sink and store failures degrade
//! to "retry next cycle", and malformed signals are dropped at the boundary.

use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Failures reported by a chat [`MessageSink`](crate::sink::MessageSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The platform refused the operation (e.g. edits on reply messages).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The call did not finish within the configured I/O timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Network or client-level failure.
    #[error("transport: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures reported by a [`TaskStore`](crate::store::TaskStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The caller supplied a record the store cannot accept.
    #[error("invalid record: {0}")]
    Invalid(String),
    /// The backing service could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// SignalError
// ---------------------------------------------------------------------------

/// Errors decoding one wire line into a listener event.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
