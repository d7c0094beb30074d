//! Outbound message builders.
//!
//! Each builder returns a ready-to-send [`MessageEnvelope`] with a fresh
//! timestamp and generated ID. Payload field names are camelCase on the wire.

use serde_json::json;

use crate::envelope::MessageEnvelope;
use crate::types;

/// Build a `system.heartbeat` keep-alive frame.
pub fn heartbeat() -> MessageEnvelope {
    MessageEnvelope::new(types::SYSTEM_HEARTBEAT, json!({}))
}

/// Build a `terminal.input` frame carrying raw keystrokes.
pub fn terminal_input(workflow_id: &str, terminal_id: &str, data: &str) -> MessageEnvelope {
    MessageEnvelope::new(
        types::TERMINAL_INPUT,
        json!({
            "workflowId": workflow_id,
            "terminalId": terminal_id,
            "data": data,
        }),
    )
}

/// Build a `terminal.resize` frame.
pub fn terminal_resize(
    workflow_id: &str,
    terminal_id: &str,
    cols: u16,
    rows: u16,
) -> MessageEnvelope {
    MessageEnvelope::new(
        types::TERMINAL_RESIZE,
        json!({
            "workflowId": workflow_id,
            "terminalId": terminal_id,
            "cols": cols,
            "rows": rows,
        }),
    )
}

/// Build a `terminal.prompt_response` frame answering a detected prompt.
pub fn prompt_response(workflow_id: &str, terminal_id: &str, response: &str) -> MessageEnvelope {
    MessageEnvelope::new(
        types::TERMINAL_PROMPT_RESPONSE,
        json!({
            "workflowId": workflow_id,
            "terminalId": terminal_id,
            "response": response,
        }),
    )
}
