//! Error types for envelope parsing.

/// Errors produced while decoding inbound frames.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The frame was not valid JSON or did not match the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope carried an empty `type` field.
    #[error("envelope has empty event type")]
    MissingEventType,
}
