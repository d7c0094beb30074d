//! Message envelope shared by all connections.
//!
//! Matches the backend wire format exactly:
//! ```json
//! { "type": "terminal.completed", "payload": {...}, "timestamp": "2026-...", "id": "msg-..." }
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventError;

/// Wire envelope wrapping every inbound and outbound message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Namespaced event type (`"<domain>.<event>"`, e.g. `terminal.completed`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload; shape varies by event type.
    #[serde(default)]
    pub payload: Value,
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub timestamp: String,
    /// Client-generated message ID, used for traceability only.
    #[serde(default)]
    pub id: String,
}

impl MessageEnvelope {
    /// Create an envelope with a fresh timestamp and generated ID.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            id: generate_message_id(),
        }
    }

    /// Parse an inbound text frame.
    ///
    /// Missing `timestamp`/`id` fields are tolerated (producers are not all
    /// consistent about them); a missing or empty `type` is not.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let envelope: Self = serde_json::from_str(text)?;
        if envelope.event_type.is_empty() {
            return Err(EventError::MissingEventType);
        }
        Ok(envelope)
    }

    /// Serialize for transmission.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize envelope");
            String::new()
        })
    }

    /// The `<domain>` prefix of the event type (`"terminal"` for
    /// `terminal.completed`).
    pub fn domain(&self) -> &str {
        self.event_type.split('.').next().unwrap_or_default()
    }
}

/// Generate a `msg-<millis>-<rand>` message ID.
///
/// Monotonically-unique-enough for tracing; never used for deduplication.
pub fn generate_message_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("msg-{}-{suffix}", chrono::Utc::now().timestamp_millis())
}
