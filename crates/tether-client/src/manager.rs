//! The public connection-manager facade.
//!
//! UIs hold one [`ConnectionManager`]. It owns the global connection, the
//! scoped-connection registry, and the explicit "current workflow" routing
//! context; transports, timers, and handler maps never leak out of it.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_events::normalize::probe_str;
use tether_events::{InboundEvent, MessageEnvelope, outbound};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionStatus};
use crate::dispatch::Subscription;
use crate::errors::ClientError;
use crate::registry::ScopedRegistry;
use crate::transport::{Transport, WsTransport};

/// Scope label of the global connection in logs.
const GLOBAL_SCOPE: &str = "global";

/// Manages the global connection plus one reference-counted connection per
/// workflow scope.
pub struct ConnectionManager {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    global: Arc<Connection>,
    scoped: ScopedRegistry,
    /// Routing context for sends without an explicit `workflowId`.
    current_workflow: Mutex<Option<String>>,
}

impl ConnectionManager {
    /// Create a manager using the production WebSocket transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Create a manager over a custom transport (the test seam).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let global = Connection::new(GLOBAL_SCOPE, config.clone(), Arc::clone(&transport));
        Self {
            config,
            transport,
            global,
            scoped: ScopedRegistry::new(),
            current_workflow: Mutex::new(None),
        }
    }

    // ── Global connection ───────────────────────────────────────────

    /// Connect the global connection to `url`.
    pub fn connect(&self, url: &str) {
        self.global.connect(url.to_string());
    }

    /// Manually disconnect the global connection; no reconnection occurs
    /// until [`connect`](Self::connect) is called again.
    pub fn disconnect(&self) {
        self.global.disconnect();
    }

    /// Status of the global connection.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.global.status()
    }

    /// Reconnect attempts of the global connection since its last
    /// successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.global.reconnect_attempts()
    }

    /// Timestamp of the last heartbeat sent on the global connection.
    pub fn last_heartbeat(&self) -> Option<String> {
        self.global.last_heartbeat()
    }

    /// Subscribe to an event type on the global connection.
    pub fn subscribe(
        &self,
        event_type: &str,
        handler: impl Fn(&InboundEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.global.subscribe(event_type, Arc::new(handler))
    }

    // ── Scoped connections ──────────────────────────────────────────

    /// Acquire the dedicated connection for a workflow.
    ///
    /// The first call opens a socket to
    /// `<base>/workflow/<workflow_id>/events`; later calls for the same ID
    /// just increment the reference count. Either way the workflow becomes
    /// the current routing context.
    pub fn connect_to_workflow(&self, workflow_id: &str) {
        let (connection, created) = self.scoped.acquire(workflow_id, || {
            Connection::new(workflow_id, self.config.clone(), Arc::clone(&self.transport))
        });
        if created {
            connection.connect(self.config.workflow_url(workflow_id));
        }
        *self.current_workflow.lock() = Some(workflow_id.to_string());
    }

    /// Release one reference to a workflow connection, tearing it down when
    /// the count reaches zero.
    pub fn disconnect_workflow(&self, workflow_id: &str) {
        if let Some(connection) = self.scoped.release(workflow_id) {
            connection.disconnect();
            let mut current = self.current_workflow.lock();
            if current.as_deref() == Some(workflow_id) {
                *current = None;
            }
        }
    }

    /// Status of a workflow connection (`Disconnected` for unknown IDs).
    pub fn workflow_connection_status(&self, workflow_id: &str) -> ConnectionStatus {
        self.scoped
            .get(workflow_id)
            .map_or(ConnectionStatus::Disconnected, |connection| connection.status())
    }

    /// Current consumer count for a workflow connection (0 for unknown IDs).
    pub fn workflow_ref_count(&self, workflow_id: &str) -> u32 {
        self.scoped.ref_count(workflow_id)
    }

    /// Subscribe to an event type on a workflow's connection.
    pub fn subscribe_to_workflow(
        &self,
        workflow_id: &str,
        event_type: &str,
        handler: impl Fn(&InboundEvent) + Send + Sync + 'static,
    ) -> Result<Subscription, ClientError> {
        let connection =
            self.scoped
                .get(workflow_id)
                .ok_or_else(|| ClientError::UnknownWorkflow {
                    workflow_id: workflow_id.to_string(),
                })?;
        Ok(connection.subscribe(event_type, Arc::new(handler)))
    }

    // ── Routing context ─────────────────────────────────────────────

    /// Override the current routing context for sends without an explicit
    /// `workflowId`. `None` routes such sends to the global connection.
    pub fn set_current_workflow(&self, workflow_id: Option<&str>) {
        *self.current_workflow.lock() = workflow_id.map(String::from);
    }

    /// The current routing context.
    pub fn current_workflow(&self) -> Option<String> {
        self.current_workflow.lock().clone()
    }

    // ── Sending ─────────────────────────────────────────────────────

    /// Send an envelope, returning whether the transport accepted it.
    ///
    /// A payload `workflowId` (either casing) pins the message to that
    /// workflow's connection: absent or closed means `false`, never a
    /// fallback to another connection. Without one, the current workflow
    /// context (or the global connection) is used.
    pub fn send(&self, envelope: &MessageEnvelope) -> bool {
        if let Some(workflow_id) = probe_str(&envelope.payload, "workflowId") {
            return match self.scoped.get(&workflow_id) {
                Some(connection) => connection.send_envelope(envelope),
                None => {
                    debug!(workflow_id, event_type = %envelope.event_type, "send target not connected");
                    false
                }
            };
        }

        let current = self.current_workflow.lock().clone();
        match current {
            Some(workflow_id) => self
                .scoped
                .get(&workflow_id)
                .is_some_and(|connection| connection.send_envelope(envelope)),
            None => self.global.send_envelope(envelope),
        }
    }

    /// Build and send a `terminal.prompt_response`, routed like
    /// [`send`](Self::send).
    pub fn send_prompt_response(
        &self,
        workflow_id: &str,
        terminal_id: &str,
        response: &str,
    ) -> bool {
        self.send(&outbound::prompt_response(workflow_id, terminal_id, response))
    }
}
