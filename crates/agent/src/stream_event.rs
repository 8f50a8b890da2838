//! Relay-level streaming events.
//!
//! `RelayEvent` is what the relay hands to its consumer. The gateway turns
//! each one into an SSE `data:` line via [`RelayEvent::to_payload`].

use serde::{Deserialize, Serialize};

/// Events emitted by the streaming relay, in order:
/// zero or more `Fragment`s followed by exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A decoded piece of model output.
    Fragment(String),

    /// The stream completed and the reply was persisted.
    Done,

    /// The stream failed. `partial` holds whatever text was produced (and
    /// persisted) before the fault.
    Error {
        message: String,
        partial: Option<String>,
    },
}

impl RelayEvent {
    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment(_))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment(_) => "chunk",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// The JSON object sent to clients for this event.
    pub fn to_payload(&self) -> SsePayload {
        match self {
            Self::Fragment(text) => SsePayload {
                chunk: Some(text.clone()),
                error: None,
                done: false,
            },
            Self::Done => SsePayload {
                chunk: Some(String::new()),
                error: None,
                done: true,
            },
            Self::Error { message, .. } => SsePayload {
                chunk: None,
                error: Some(message.clone()),
                done: true,
            },
        }
    }
}

/// Wire shape of one SSE event: `{"chunk", "done"}` or `{"error", "done"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub done: bool,
}
