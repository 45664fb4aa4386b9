//! Event types for the relay pipeline.
//!
//! Two event families:
//!
//! - **[`StreamEvent`]**: Low-level completion-provider streaming events
//!   (start, text deltas, done). Purely in-memory, never persisted.
//! - **[`WireEvent`]**: The JSON envelope pushed to connected clients over
//!   the delivery channel (`ReceiveMessage` chunks, error notices,
//!   connection lifecycle).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::ConnectionId;

/// Event name for chunk and error-notice payloads pushed to clients.
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";

/// Event name sent once after a client connects, carrying its assigned id.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Prefix for the human-readable error notice delivered when a stream
/// terminates abnormally.
pub const ERROR_PREFIX: &str = "Error: ";

// ─────────────────────────────────────────────────────────────────────────────
// StreamEvent — provider streaming protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Events emitted while a completion provider streams a response.
///
/// The sequence is finite, in-order, and non-restartable: `Start`, zero or
/// more `TextDelta`s, then `Done`. Abnormal termination surfaces as an `Err`
/// item in the stream, not as a variant here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Stream opened.
    #[serde(rename = "start")]
    Start,

    /// Incremental text content.
    #[serde(rename = "text_delta")]
    TextDelta {
        /// Text fragment.
        delta: String,
    },

    /// Stream completed normally.
    #[serde(rename = "done")]
    Done {
        /// Full accumulated text.
        text: String,
        /// Stop reason reported by the provider, if any.
        #[serde(rename = "finishReason", skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

impl StreamEvent {
    /// Returns the delta text if this is a `TextDelta` event.
    #[must_use]
    pub fn delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta { delta } => Some(delta),
            _ => None,
        }
    }

    /// Returns true if this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WireEvent — client-facing envelope
// ─────────────────────────────────────────────────────────────────────────────

/// JSON envelope for everything pushed to a client.
///
/// The payload of a `ReceiveMessage` event is the raw chunk text, or a
/// string prefixed `Error: ` when a stream terminated abnormally — the
/// client renders both the same way, matching the wire contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event name (`ReceiveMessage`, `connection.established`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: Value,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl WireEvent {
    fn now(event_type: &str, data: Value) -> Self {
        Self {
            event_type: event_type.to_owned(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A `ReceiveMessage` event carrying one chunk of assistant text.
    #[must_use]
    pub fn receive_message(text: impl Into<String>) -> Self {
        Self::now(RECEIVE_MESSAGE, Value::String(text.into()))
    }

    /// A `ReceiveMessage` event carrying an error notice (`Error: <message>`).
    #[must_use]
    pub fn error_notice(message: &str) -> Self {
        Self::now(RECEIVE_MESSAGE, Value::String(format!("{ERROR_PREFIX}{message}")))
    }

    /// The `connection.established` event sent once after connect.
    #[must_use]
    pub fn connection_established(connection_id: &ConnectionId) -> Self {
        Self::now(
            CONNECTION_ESTABLISHED,
            json!({ "connectionId": connection_id.as_str() }),
        )
    }

    /// Returns the chunk text if this is a `ReceiveMessage` event.
    #[must_use]
    pub fn message_text(&self) -> Option<&str> {
        if self.event_type == RECEIVE_MESSAGE {
            self.data.as_str()
        } else {
            None
        }
    }

    /// Whether this is an error notice.
    #[must_use]
    pub fn is_error_notice(&self) -> bool {
        self.message_text()
            .is_some_and(|t| t.starts_with(ERROR_PREFIX))
    }
}
