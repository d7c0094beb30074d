//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Tether client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base WebSocket URL of the orchestration backend.
    pub base_url: String,
    /// Heartbeat interval in seconds while connected.
    pub heartbeat_interval_secs: u64,
    /// Base delay for exponential reconnect backoff, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:4420/ws".into(),
            heartbeat_interval_secs: 30,
            reconnect_base_delay_ms: 1_000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Backoff delay for reconnect attempt `n` (1-indexed):
    /// `base * 2^(n-1)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(1 << exponent))
    }

    /// URL of the dedicated connection for a workflow scope.
    pub fn workflow_url(&self, workflow_id: &str) -> String {
        format!(
            "{}/workflow/{workflow_id}/events",
            self.base_url.trim_end_matches('/')
        )
    }
}
