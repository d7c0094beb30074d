//! Payload normalization.
//!
//! Backend producers are inconsistent about payload field naming: the same
//! logical field arrives as `workflowId` or `workflow_id`, sometimes mixed
//! within one payload, and some fields arrive as stringified numbers or
//! booleans. Normalization is a pure transform applied to every inbound
//! payload before dispatch:
//!
//! 1. resolve each logical field by probing the camelCase key, then the
//!    snake_case key; first hit wins;
//! 2. coerce stringified numerics/booleans for fields with a known domain;
//! 3. map closed-set raw enum spellings to canonical values, preserving
//!    unrecognized spellings under a `*Raw` sibling;
//! 4. include optional context fields only when present in the raw payload.

use serde_json::Value;

use crate::envelope::MessageEnvelope;
use crate::types;

pub mod terminal;

pub use terminal::{
    Decision, DecisionDetail, PromptDecision, PromptDetected, PromptKind, PromptOption,
    TerminalCompleted, TerminalStatusChanged,
};

/// A payload after normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedPayload {
    /// `terminal.completed`
    TerminalCompleted(TerminalCompleted),
    /// `terminal.prompt_detected`
    PromptDetected(PromptDetected),
    /// `terminal.prompt_decision`
    PromptDecision(PromptDecision),
    /// `terminal.status_changed`
    TerminalStatusChanged(TerminalStatusChanged),
    /// Any event type without a typed normalizer (`workflow.*`, `git.*`, …).
    Raw(Value),
}

/// An inbound event ready for dispatch: the envelope metadata plus the
/// normalized payload.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    /// Namespaced event type from the envelope.
    pub event_type: String,
    /// Envelope timestamp (may be empty for sloppy producers).
    pub timestamp: String,
    /// Envelope message ID (may be empty for sloppy producers).
    pub id: String,
    /// The normalized payload.
    pub payload: NormalizedPayload,
}

impl InboundEvent {
    /// Normalize a parsed envelope into a dispatchable event.
    pub fn from_envelope(envelope: &MessageEnvelope) -> Self {
        Self {
            event_type: envelope.event_type.clone(),
            timestamp: envelope.timestamp.clone(),
            id: envelope.id.clone(),
            payload: normalize_payload(&envelope.event_type, &envelope.payload),
        }
    }
}

/// Normalize a raw payload for the given event type.
///
/// Event types without a typed normalizer pass through as
/// [`NormalizedPayload::Raw`].
pub fn normalize_payload(event_type: &str, payload: &Value) -> NormalizedPayload {
    match event_type {
        types::TERMINAL_COMPLETED => {
            NormalizedPayload::TerminalCompleted(terminal::normalize_completed(payload))
        }
        types::TERMINAL_PROMPT_DETECTED => {
            NormalizedPayload::PromptDetected(terminal::normalize_prompt_detected(payload))
        }
        types::TERMINAL_PROMPT_DECISION => {
            NormalizedPayload::PromptDecision(terminal::normalize_prompt_decision(payload))
        }
        types::TERMINAL_STATUS_CHANGED => {
            NormalizedPayload::TerminalStatusChanged(terminal::normalize_status_changed(payload))
        }
        _ => NormalizedPayload::Raw(payload.clone()),
    }
}

/// Derive the snake_case spelling of a camelCase key (`workflowId` →
/// `workflow_id`).
fn snake_key(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for c in camel.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolve a logical field: probe the camelCase key, then its snake_case
/// spelling. Explicit JSON `null` counts as absent.
pub fn probe<'a>(payload: &'a Value, camel: &str) -> Option<&'a Value> {
    let obj = payload.as_object()?;
    obj.get(camel)
        .filter(|v| !v.is_null())
        .or_else(|| obj.get(&snake_key(camel)).filter(|v| !v.is_null()))
}

/// Resolve the first present key from an ordered candidate list, probing
/// each candidate in both casings.
pub fn probe_first<'a>(payload: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|key| probe(payload, key))
}

/// Resolve a string field.
pub fn probe_str(payload: &Value, camel: &str) -> Option<String> {
    probe(payload, camel).and_then(Value::as_str).map(String::from)
}

/// Resolve a numeric field, coercing stringified numbers (`"0.76"` → `0.76`).
pub fn probe_f64(payload: &Value, camel: &str) -> Option<f64> {
    let value = probe(payload, camel)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Resolve an integer field, coercing stringified integers (`"2"` → `2`).
pub fn probe_i64(payload: &Value, camel: &str) -> Option<i64> {
    let value = probe(payload, camel)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Resolve a boolean field, coercing stringified booleans (`"true"` → `true`).
pub fn probe_bool(payload: &Value, camel: &str) -> Option<bool> {
    let value = probe(payload, camel)?;
    value.as_bool().or_else(|| match value.as_str() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    })
}
