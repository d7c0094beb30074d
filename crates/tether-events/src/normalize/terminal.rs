//! Canonical shapes and normalizers for `terminal.*` event payloads.
//!
//! These are the payloads with the messiest wire history: producers disagree
//! on field casing and on enum spellings, so each normalizer funnels every
//! observed spelling through a fixed rename table. Canonical spellings are
//! lower-snake; anything outside a table becomes `unknown` with the original
//! preserved under the `*Raw` sibling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{probe, probe_bool, probe_f64, probe_first, probe_i64, probe_str};

// ---------------------------------------------------------------------------
// terminal.completed
// ---------------------------------------------------------------------------

/// Canonical `terminal.completed` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalCompleted {
    /// Owning workflow.
    pub workflow_id: String,
    /// Task the terminal was executing.
    pub task_id: String,
    /// The terminal that completed.
    pub terminal_id: String,
    /// Completion status, canonicalized via the rename table.
    pub status: String,
    /// Commit produced by the task, when one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    /// Message of the produced commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

/// Canonicalize a completion status spelling.
///
/// Spellings outside the table pass through unchanged; the status vocabulary
/// is open-ended on the backend side.
fn canonical_completion_status(raw: &str) -> String {
    let canonical = match raw {
        "success" | "succeeded" | "ok" => "success",
        "failed" | "failure" | "error" => "failed",
        "review_pass" | "review_passed" => "review_pass",
        "review_fail" | "review_failed" => "review_fail",
        "cancelled" | "canceled" => "cancelled",
        other => other,
    };
    canonical.to_string()
}

/// Normalize a raw `terminal.completed` payload.
pub fn normalize_completed(payload: &Value) -> TerminalCompleted {
    TerminalCompleted {
        workflow_id: probe_str(payload, "workflowId").unwrap_or_default(),
        task_id: probe_str(payload, "taskId").unwrap_or_default(),
        terminal_id: probe_str(payload, "terminalId").unwrap_or_default(),
        status: canonical_completion_status(
            &probe_str(payload, "status").unwrap_or_default(),
        ),
        commit_hash: probe_str(payload, "commitHash"),
        commit_message: probe_str(payload, "commitMessage"),
    }
}

// ---------------------------------------------------------------------------
// terminal.prompt_detected
// ---------------------------------------------------------------------------

/// Kind of interactive prompt detected in a terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Press enter to confirm.
    EnterConfirm,
    /// Arrow-key selection menu.
    ArrowSelect,
    /// Yes/no confirmation.
    YesNo,
    /// Unrecognized spelling; see `prompt_kind_raw`.
    Unknown,
}

impl PromptKind {
    /// Map a raw wire spelling to the canonical kind.
    fn from_raw(raw: &str) -> Self {
        match raw {
            "EnterConfirm" | "enter_confirm" => Self::EnterConfirm,
            "ArrowSelect" | "arrow_select" => Self::ArrowSelect,
            "Confirmation" | "yes_no" => Self::YesNo,
            _ => Self::Unknown,
        }
    }
}

/// One structured option of an arrow-select prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOption {
    /// Position of the option as reported by the detector.
    pub index: i64,
    /// Display label.
    pub label: String,
    /// Whether the cursor currently rests on this option.
    pub selected: bool,
}

/// Canonical `terminal.prompt_detected` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDetected {
    /// Owning workflow.
    pub workflow_id: String,
    /// Terminal showing the prompt.
    pub terminal_id: String,
    /// Task context, when the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Session context, when the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Canonical prompt kind.
    pub prompt_kind: PromptKind,
    /// Original spelling when `prompt_kind` is `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_kind_raw: Option<String>,
    /// Text of the detected prompt.
    pub prompt_text: String,
    /// Detector confidence, 0.0..=1.0.
    pub confidence: f64,
    /// Whether the prompt text matched the dangerous-keyword list.
    pub has_dangerous_keywords: bool,
    /// Option labels (derived from `option_details` when present).
    pub options: Vec<String>,
    /// Index of the currently selected option; `null` when none.
    pub selected_index: Option<i64>,
    /// Structured option list, preserved when the producer sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_details: Option<Vec<PromptOption>>,
}

#[allow(clippy::cast_possible_wrap)]
fn normalize_option(position: usize, raw: &Value) -> PromptOption {
    PromptOption {
        index: probe_i64(raw, "index").unwrap_or(position as i64),
        label: probe_str(raw, "label").unwrap_or_default(),
        selected: probe_bool(raw, "selected").unwrap_or(false),
    }
}

/// Normalize a raw `terminal.prompt_detected` payload.
pub fn normalize_prompt_detected(payload: &Value) -> PromptDetected {
    let (prompt_kind, prompt_kind_raw) = match probe_str(payload, "promptKind") {
        Some(raw) => {
            let kind = PromptKind::from_raw(&raw);
            let preserved = (kind == PromptKind::Unknown).then_some(raw);
            (kind, preserved)
        }
        None => (PromptKind::Unknown, None),
    };

    let option_details: Option<Vec<PromptOption>> = probe(payload, "optionDetails")
        .and_then(Value::as_array)
        .map(|raw_options| {
            raw_options
                .iter()
                .enumerate()
                .map(|(position, raw)| normalize_option(position, raw))
                .collect()
        });

    // Scalar convenience fields derive from the structured list when the
    // producer sent one; otherwise they are probed directly.
    let (options, selected_index) = match &option_details {
        Some(details) => {
            let labels = details.iter().map(|o| o.label.clone()).collect();
            let selected = details
                .iter()
                .find(|o| o.selected)
                .map(|o| o.index)
                .or_else(|| probe_i64(payload, "selectedIndex"));
            (labels, selected)
        }
        None => {
            let labels = probe(payload, "options")
                .and_then(Value::as_array)
                .map(|raw_options| {
                    raw_options
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            (labels, probe_i64(payload, "selectedIndex"))
        }
    };

    PromptDetected {
        workflow_id: probe_str(payload, "workflowId").unwrap_or_default(),
        terminal_id: probe_str(payload, "terminalId").unwrap_or_default(),
        task_id: probe_str(payload, "taskId"),
        session_id: probe_str(payload, "sessionId"),
        prompt_kind,
        prompt_kind_raw,
        prompt_text: probe_str(payload, "promptText").unwrap_or_default(),
        confidence: probe_f64(payload, "confidence").unwrap_or(0.0),
        has_dangerous_keywords: probe_bool(payload, "hasDangerousKeywords").unwrap_or(false),
        options,
        selected_index,
        option_details,
    }
}

// ---------------------------------------------------------------------------
// terminal.prompt_decision
// ---------------------------------------------------------------------------

/// Canonical decision taken on a detected prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Approve/accept the prompt.
    Approve,
    /// Reject/deny the prompt.
    Reject,
    /// Type a free-form response.
    Respond,
    /// Pick an option from a selection menu.
    SelectOption,
    /// Hand the prompt to a human.
    Escalate,
    /// Unrecognized action; see `decision_raw`.
    Unknown,
}

impl Decision {
    /// Map a raw action spelling to the canonical decision.
    fn from_raw(raw: &str) -> Self {
        match raw {
            "approve" | "approved" | "accept" | "accepted" => Self::Approve,
            "reject" | "rejected" | "deny" | "denied" => Self::Reject,
            "respond" | "response" | "reply" => Self::Respond,
            "select_option" | "select" | "choose" => Self::SelectOption,
            "escalate" | "defer" => Self::Escalate,
            _ => Self::Unknown,
        }
    }
}

/// Structured decision detail, preserved when the producer sent the object
/// form instead of a bare action string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDetail {
    /// Raw action string from the object form.
    pub action: String,
    /// Free-form response text, for `respond` decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Reasoning the orchestrator attached to the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Target option index, for `select_option` decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<i64>,
    /// Alternative suggestions the orchestrator considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// Canonical `terminal.prompt_decision` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDecision {
    /// Owning workflow.
    pub workflow_id: String,
    /// Terminal the decision applies to.
    pub terminal_id: String,
    /// Task context, when the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Session context, when the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Canonical decision.
    pub decision: Decision,
    /// Original action spelling when `decision` is `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_raw: Option<String>,
    /// Structured detail when the decision arrived in object form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_detail: Option<DecisionDetail>,
}

/// Normalize a raw `terminal.prompt_decision` payload.
///
/// The `decision` field may arrive as a bare string or as a structured
/// object whose `action` field carries the decision.
pub fn normalize_prompt_decision(payload: &Value) -> PromptDecision {
    let mut decision = Decision::Unknown;
    let mut decision_raw = None;
    let mut decision_detail = None;

    match probe(payload, "decision") {
        Some(Value::String(raw)) => {
            decision = Decision::from_raw(raw);
            if decision == Decision::Unknown {
                decision_raw = Some(raw.clone());
            }
        }
        Some(raw_object @ Value::Object(_)) => {
            let action = probe_str(raw_object, "action").unwrap_or_default();
            decision = Decision::from_raw(&action);
            if decision == Decision::Unknown && !action.is_empty() {
                decision_raw = Some(action.clone());
            }
            decision_detail = Some(DecisionDetail {
                action,
                response: probe_str(raw_object, "response"),
                reasoning: probe_str(raw_object, "reasoning"),
                target_index: probe_i64(raw_object, "targetIndex"),
                suggestions: probe(raw_object, "suggestions")
                    .and_then(Value::as_array)
                    .map(|raw_suggestions| {
                        raw_suggestions
                            .iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    }),
            });
        }
        _ => {}
    }

    PromptDecision {
        workflow_id: probe_str(payload, "workflowId").unwrap_or_default(),
        terminal_id: probe_str(payload, "terminalId").unwrap_or_default(),
        task_id: probe_str(payload, "taskId"),
        session_id: probe_str(payload, "sessionId"),
        decision,
        decision_raw,
        decision_detail,
    }
}

// ---------------------------------------------------------------------------
// terminal.status_changed
// ---------------------------------------------------------------------------

/// Canonical `terminal.status_changed` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalStatusChanged {
    /// Owning workflow.
    pub workflow_id: String,
    /// Terminal whose status changed.
    pub terminal_id: String,
    /// New status.
    pub status: String,
    /// Previous status, when the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
}

/// Normalize a raw `terminal.status_changed` payload.
///
/// Some producers spell the fields `newStatus`/`oldStatus` instead of
/// `status`/`previousStatus`.
pub fn normalize_status_changed(payload: &Value) -> TerminalStatusChanged {
    TerminalStatusChanged {
        workflow_id: probe_str(payload, "workflowId").unwrap_or_default(),
        terminal_id: probe_str(payload, "terminalId").unwrap_or_default(),
        status: probe_first(payload, &["status", "newStatus"])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        previous_status: probe_first(payload, &["previousStatus", "oldStatus"])
            .and_then(Value::as_str)
            .map(String::from),
    }
}
