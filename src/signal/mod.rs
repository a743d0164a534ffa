//! Inbound signal schema and boundary decoding.
//!
//! Producers emit loosely typed envelopes (an event name plus a key/value
//! payload). They are decoded once, here, into [`Signal`] variants with
//! typed optional fields; nothing past this module touches raw JSON.

use crate::error::SignalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope event name for task dispatch.
pub const EVENT_DISPATCHED: &str = "background_task.dispatched";
/// Envelope event name for external agent progress.
pub const EVENT_PROGRESS: &str = "external_agent.progress";
/// Envelope event name for an agent asking for input.
pub const EVENT_INPUT_REQUESTED: &str = "external_agent.input_requested";
/// Envelope event name for task completion.
pub const EVENT_COMPLETED: &str = "background_task.completed";

/// A background task was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub task_id: String,
    pub description: Option<String>,
    pub agent_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Progress report from the agent running a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub task_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub current_tool: Option<String>,
    pub current_args: Option<String>,
    pub tokens_used: Option<u64>,
    pub files_touched: Vec<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// The agent is blocked until the user answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequested {
    pub task_id: String,
    pub summary: Option<String>,
}

/// Terminal outcome of a task. Shared by the envelope and direct paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Completion {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// Typed inbound signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Dispatched(Dispatched),
    Progress(Progress),
    InputRequested(InputRequested),
    Completed(Completion),
}

impl Signal {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Dispatched(s) => &s.task_id,
            Self::Progress(s) => &s.task_id,
            Self::InputRequested(s) => &s.task_id,
            Self::Completed(s) => &s.task_id,
        }
    }
}

/// What a producer hands the listener.
///
/// `Envelope` arrives through the ordered event path. `DirectCompletion`
/// bypasses it for producers whose ordered queue may already be gone. Both
/// feed the same idempotent completion handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Envelope(Signal),
    DirectCompletion(Completion),
}

/// Raw envelope as produced on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawEnvelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// One wire line: an envelope or a direct completion.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLine {
    Direct { completion: Completion },
    Envelope(RawEnvelope),
}

/// Decode an envelope into a typed signal.
///
/// Returns `None` for unknown event names and for signals without a task id;
/// both are dropped without surfacing an error.
pub fn decode_envelope(raw: &RawEnvelope) -> Option<Signal> {
    let payload = &raw.payload;
    let node_id = raw.node_id.as_deref().and_then(clean);
    let payload_task_id = str_field(payload, "task_id");

    let signal = match raw.event.trim() {
        EVENT_DISPATCHED => Signal::Dispatched(Dispatched {
            task_id: node_id.or(payload_task_id)?,
            description: str_field(payload, "description"),
            agent_type: str_field(payload, "agent_type"),
            timestamp: raw.timestamp,
        }),
        EVENT_PROGRESS => Signal::Progress(Progress {
            task_id: payload_task_id.or(node_id)?,
            timestamp: raw.timestamp,
            current_tool: str_field(payload, "current_tool"),
            current_args: str_field(payload, "current_args"),
            tokens_used: u64_field(payload, "tokens_used"),
            files_touched: str_list_field(payload, "files_touched"),
            last_activity: time_field(payload, "last_activity"),
        }),
        EVENT_INPUT_REQUESTED => Signal::InputRequested(InputRequested {
            task_id: payload_task_id.or(node_id)?,
            summary: str_field(payload, "summary"),
        }),
        EVENT_COMPLETED => Signal::Completed(Completion {
            task_id: payload_task_id.or(node_id)?,
            status: str_field(payload, "status"),
            answer: str_field(payload, "answer"),
            error: str_field(payload, "error"),
            tokens_used: u64_field(payload, "tokens_used"),
        }),
        _ => return None,
    };
    Some(signal)
}

/// Decode one JSON line into a listener event.
///
/// Blank lines, unknown events and signals missing a task id yield
/// `Ok(None)`; only malformed JSON is an error.
pub fn parse_wire_line(line: &str) -> Result<Option<ListenerEvent>, SignalError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event = match serde_json::from_str::<WireLine>(line)? {
        WireLine::Direct { mut completion } => {
            completion.task_id = completion.task_id.trim().to_string();
            if completion.task_id.is_empty() {
                return Ok(None);
            }
            ListenerEvent::DirectCompletion(completion)
        }
        WireLine::Envelope(raw) => match decode_envelope(&raw) {
            Some(signal) => ListenerEvent::Envelope(signal),
            None => return Ok(None),
        },
    };
    Ok(Some(event))
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn str_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).and_then(clean)
}

fn u64_field(payload: &Map<String, Value>, key: &str) -> Option<u64> {
    match payload.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn time_field(payload: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = payload.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn str_list_field(payload: &Map<String, Value>, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).filter_map(clean).collect())
        .unwrap_or_default()
}
