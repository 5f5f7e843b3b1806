//! Wire codec for the persistent connection.
//!
//! Inbound frames are JSON objects:
//!
//! ```json
//! { "type": "log", "content": "Searching components...",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "metadata": { "tool": "Search", "input": "RTX 4060 price" } }
//! ```
//!
//! A frame is accepted only if it is an object with a recognized `type` and
//! a string `content`. Everything else is reported as a `parse`
//! [`SessionError`]; the caller drops the frame and keeps the session.
//! `timestamp` is informational and not validated.
//!
//! The only outbound frame is the query submission `{ "query": "..." }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::SessionError;
use crate::errors::classify::malformed_frame;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Liveness signal from the service.
    Heartbeat,
    /// Progress notification for the in-flight query.
    Log {
        /// Progress text.
        text: String,
        /// Structured context (tool name, tool input).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<LogMetadata>,
    },
    /// Terminal result of the in-flight query.
    FinalOutput {
        /// Result text (may be empty).
        text: String,
    },
    /// Advisory status note from the service.
    ConnectionStatus {
        /// Status text.
        text: String,
    },
}

impl InboundEvent {
    /// Wire tag of this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Log { .. } => "log",
            Self::FinalOutput { .. } => "final_output",
            Self::ConnectionStatus { .. } => "connection_status",
        }
    }
}

/// Structured metadata attached to a `log` frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    /// Input the service passed to a tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Tool the service invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Any other keys, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogMetadata {
    /// Build metadata from a raw JSON value.
    ///
    /// Non-object metadata is ignored. Non-string `input`/`tool` values are
    /// kept in `extra` rather than rejected.
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let input = take_string(&mut map, "input");
        let tool = take_string(&mut map, "tool");
        Some(Self {
            input,
            tool,
            extra: map,
        })
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Why a frame was rejected.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is JSON but not an object.
    #[error("frame is not an object")]
    NotAnObject,
    /// The `type` field is missing or not a string.
    #[error("missing or non-string \"type\"")]
    MissingType,
    /// The `type` value is not one of the four known events.
    #[error("unrecognized type \"{0}\"")]
    UnknownType(String),
    /// The `content` field is missing or not a string.
    #[error("missing or non-string \"content\"")]
    MissingContent,
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<InboundEvent, SessionError> {
    parse_frame(text).map_err(|e| malformed_frame(&e))
}

fn parse_frame(text: &str) -> Result<InboundEvent, CodecError> {
    let Value::Object(mut map) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };

    let kind = match map.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(CodecError::MissingType),
    };
    if !matches!(
        kind.as_str(),
        "heartbeat" | "log" | "final_output" | "connection_status"
    ) {
        return Err(CodecError::UnknownType(kind));
    }

    let content = match map.remove("content") {
        Some(Value::String(content)) => content,
        _ => return Err(CodecError::MissingContent),
    };

    Ok(match kind.as_str() {
        "heartbeat" => InboundEvent::Heartbeat,
        "log" => InboundEvent::Log {
            text: content,
            metadata: map.remove("metadata").and_then(LogMetadata::from_value),
        },
        "final_output" => InboundEvent::FinalOutput { text: content },
        _ => InboundEvent::ConnectionStatus { text: content },
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Query submission frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Trimmed query text.
    pub query: String,
}

impl OutboundFrame {
    /// Serialize to the wire format.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({ "query": self.query }).to_string()
    }
}

/// Encode a query submission.
#[must_use]
pub fn encode_query(query: &str) -> String {
    OutboundFrame {
        query: query.to_owned(),
    }
    .to_json()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
