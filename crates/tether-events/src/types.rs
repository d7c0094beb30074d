//! Event-type string constants.
//!
//! Types are namespaced `"<domain>.<event>"`. Whole domains (`workflow.*`,
//! `git.*`, `orchestrator.*`) pass through dispatch without a typed
//! normalizer, so only the domains themselves are named here for those.

/// Domain prefix for workflow lifecycle events.
pub const DOMAIN_WORKFLOW: &str = "workflow";
/// Domain prefix for terminal events.
pub const DOMAIN_TERMINAL: &str = "terminal";
/// Domain prefix for git events.
pub const DOMAIN_GIT: &str = "git";
/// Domain prefix for orchestrator events.
pub const DOMAIN_ORCHESTRATOR: &str = "orchestrator";
/// Domain prefix for system/plumbing events.
pub const DOMAIN_SYSTEM: &str = "system";

/// A terminal finished its task.
pub const TERMINAL_COMPLETED: &str = "terminal.completed";
/// An interactive prompt was detected in a terminal.
pub const TERMINAL_PROMPT_DETECTED: &str = "terminal.prompt_detected";
/// The orchestrator decided how to answer a detected prompt.
pub const TERMINAL_PROMPT_DECISION: &str = "terminal.prompt_decision";
/// A terminal changed status.
pub const TERMINAL_STATUS_CHANGED: &str = "terminal.status_changed";

/// Outbound: raw keystrokes for a terminal.
pub const TERMINAL_INPUT: &str = "terminal.input";
/// Outbound: terminal viewport resize.
pub const TERMINAL_RESIZE: &str = "terminal.resize";
/// Outbound: user answer to a detected prompt.
pub const TERMINAL_PROMPT_RESPONSE: &str = "terminal.prompt_response";
/// Outbound: keep-alive frame.
pub const SYSTEM_HEARTBEAT: &str = "system.heartbeat";
