//! Connection lifecycle state machine.
//!
//! One [`Connection`] owns one logical WebSocket session: its transport
//! handle, status, heartbeat task, reconnect timer, and handler registry.
//! Staleness is guarded by a monotonic generation counter: every transport
//! callback and timer captures the generation at spawn and no-ops once the
//! connection has moved on to a newer transport.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tether_events::MessageEnvelope;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::{Handler, HandlerRegistry, Subscription, dispatch_text};
use crate::transport::{Transport, TransportEvent, TransportSink};

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport, and none being established.
    Disconnected,
    /// A transport is being established.
    Connecting,
    /// The transport is open.
    Connected,
    /// The transport dropped unexpectedly; a retry is pending or in flight.
    Reconnecting,
}

struct ConnState {
    status: ConnectionStatus,
    url: Option<String>,
    reconnect_attempts: u32,
    manual_disconnect: bool,
    /// Bumped on every `connect`/`disconnect`; callbacks from older
    /// transports check it and bail.
    generation: u64,
    sink: Option<Arc<dyn TransportSink>>,
    heartbeat: Option<CancellationToken>,
    reconnect_timer: Option<CancellationToken>,
    last_heartbeat: Option<String>,
}

/// One logical WebSocket session plus its lifecycle and timer state.
pub(crate) struct Connection {
    /// Scope label for logging (`"global"` or a workflow ID).
    scope: String,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnState>,
    handlers: Arc<HandlerRegistry>,
}

impl Connection {
    pub(crate) fn new(
        scope: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scope: scope.into(),
            config,
            transport,
            state: Mutex::new(ConnState {
                status: ConnectionStatus::Disconnected,
                url: None,
                reconnect_attempts: 0,
                manual_disconnect: false,
                generation: 0,
                sink: None,
                heartbeat: None,
                reconnect_timer: None,
                last_heartbeat: None,
            }),
            handlers: Arc::new(HandlerRegistry::new()),
        })
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    pub(crate) fn reconnect_attempts(&self) -> u32 {
        self.state.lock().reconnect_attempts
    }

    pub(crate) fn last_heartbeat(&self) -> Option<String> {
        self.state.lock().last_heartbeat.clone()
    }

    /// Register a handler for an event type on this connection.
    pub(crate) fn subscribe(&self, event_type: &str, handler: Handler) -> Subscription {
        let id = self.handlers.add(event_type, handler);
        Subscription::new(Arc::downgrade(&self.handlers), event_type.to_string(), id)
    }

    /// Open (or reopen) the transport.
    ///
    /// Any existing transport is torn down first; its pending callbacks are
    /// staled by the generation bump.
    pub(crate) fn connect(self: &Arc<Self>, url: String) {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            if let Some(token) = state.heartbeat.take() {
                token.cancel();
            }
            if let Some(token) = state.reconnect_timer.take() {
                token.cancel();
            }
            if let Some(sink) = state.sink.take() {
                sink.close();
            }
            state.status = ConnectionStatus::Connecting;
            state.manual_disconnect = false;
            state.url = Some(url.clone());
            state.generation
        };
        debug!(scope = %self.scope, url, "opening transport");
        let connection = Arc::clone(self);
        let _ = tokio::spawn(async move { connection.drive(generation, url).await });
    }

    /// Tear the connection down and suppress any further reconnection until
    /// the next `connect`.
    pub(crate) fn disconnect(&self) {
        let mut state = self.state.lock();
        state.manual_disconnect = true;
        state.generation += 1;
        if let Some(token) = state.heartbeat.take() {
            token.cancel();
        }
        if let Some(token) = state.reconnect_timer.take() {
            token.cancel();
        }
        if let Some(sink) = state.sink.take() {
            sink.close();
        }
        state.status = ConnectionStatus::Disconnected;
        state.reconnect_attempts = 0;
        drop(state);
        info!(scope = %self.scope, "disconnected");
    }

    /// Send a serialized frame. Returns `false` unless the connection is
    /// `Connected` with an open transport; nothing is buffered.
    pub(crate) fn send_text(&self, text: String) -> bool {
        let sink = {
            let state = self.state.lock();
            if state.status != ConnectionStatus::Connected {
                return false;
            }
            match &state.sink {
                Some(sink) if sink.is_open() => Arc::clone(sink),
                _ => return false,
            }
        };
        sink.send(text)
    }

    /// Serialize and send an envelope.
    pub(crate) fn send_envelope(&self, envelope: &MessageEnvelope) -> bool {
        let json = envelope.to_json();
        if json.is_empty() {
            return false;
        }
        self.send_text(json)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Driver task: establish the transport, then pump its events.
    async fn drive(self: Arc<Self>, generation: u64, url: String) {
        match self.transport.connect(&url).await {
            Ok((sink, mut events)) => {
                if !self.on_open(generation, sink) {
                    return;
                }
                while let Some(event) = events.recv().await {
                    if !self.is_current(generation) {
                        return;
                    }
                    match event {
                        TransportEvent::Message(text) => {
                            dispatch_text(&self.handlers, &self.scope, &text);
                        }
                        TransportEvent::Error(reason) => {
                            // The close event that follows drives reconnection;
                            // acting here would double-schedule.
                            warn!(scope = %self.scope, reason, "transport error");
                        }
                        TransportEvent::Closed { code } => {
                            self.on_close(generation, code);
                            return;
                        }
                    }
                }
                // Event channel dropped without a close frame.
                self.on_close(generation, None);
            }
            Err(error) => {
                warn!(scope = %self.scope, error = %error, "transport connect failed");
                self.on_close(generation, None);
            }
        }
    }

    /// Transport opened: mark connected and start the heartbeat.
    ///
    /// Returns `false` when a newer `connect`/`disconnect` superseded this
    /// attempt while the handshake was in flight.
    fn on_open(self: &Arc<Self>, generation: u64, sink: Arc<dyn TransportSink>) -> bool {
        let token = {
            let mut state = self.state.lock();
            if state.generation != generation || state.manual_disconnect {
                drop(state);
                sink.close();
                return false;
            }
            state.status = ConnectionStatus::Connected;
            state.reconnect_attempts = 0;
            state.sink = Some(Arc::clone(&sink));
            let token = CancellationToken::new();
            state.heartbeat = Some(token.clone());
            token
        };
        info!(scope = %self.scope, "connected");
        let connection = Arc::clone(self);
        let _ = tokio::spawn(async move { connection.run_heartbeat(generation, token).await });
        true
    }

    /// Transport closed. Stale closes are no-ops; manual disconnects stay
    /// down; anything else drives the reconnect policy.
    fn on_close(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(token) = state.heartbeat.take() {
            token.cancel();
        }
        state.sink = None;

        if state.manual_disconnect {
            state.status = ConnectionStatus::Disconnected;
            return;
        }

        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        if attempt > self.config.max_reconnect_attempts {
            state.status = ConnectionStatus::Disconnected;
            drop(state);
            warn!(
                scope = %self.scope,
                attempts = self.config.max_reconnect_attempts,
                "reconnect ceiling reached, giving up"
            );
            return;
        }

        state.status = ConnectionStatus::Reconnecting;
        warn!(scope = %self.scope, code = ?code, attempt, "connection closed unexpectedly");
        self.schedule_reconnect(&mut state, attempt);
    }

    /// Schedule the next reconnect attempt. At most one timer may be pending;
    /// a request while one exists is ignored.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnState, attempt: u32) {
        if state.reconnect_timer.is_some() {
            return;
        }
        let Some(url) = state.url.clone() else {
            return;
        };
        if state.manual_disconnect {
            return;
        }

        let delay = self.config.reconnect_delay(attempt);
        let generation = state.generation;
        let token = CancellationToken::new();
        state.reconnect_timer = Some(token.clone());
        debug!(scope = %self.scope, attempt, delay = ?delay, "scheduling reconnect");

        let connection = Arc::clone(self);
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    {
                        let mut state = connection.state.lock();
                        if state.generation != generation || state.manual_disconnect {
                            return;
                        }
                        state.reconnect_timer = None;
                    }
                    connection.connect(url);
                }
                () = token.cancelled() => {}
            }
        });
    }

    /// Heartbeat task: one keep-alive frame per interval while connected.
    async fn run_heartbeat(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let mut ticks = tokio::time::interval(self.config.heartbeat_interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the cadence starts one full
        // interval after open.
        let _ = ticks.tick().await;
        loop {
            tokio::select! {
                _ = ticks.tick() => self.send_heartbeat(generation),
                () = cancel.cancelled() => return,
            }
        }
    }

    /// Send one heartbeat frame, skipping silently unless still connected on
    /// the current transport.
    fn send_heartbeat(&self, generation: u64) {
        let sink = {
            let state = self.state.lock();
            if state.generation != generation || state.status != ConnectionStatus::Connected {
                return;
            }
            match &state.sink {
                Some(sink) if sink.is_open() => Arc::clone(sink),
                _ => return,
            }
        };
        let frame = tether_events::outbound::heartbeat();
        if sink.send(frame.to_json()) {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.last_heartbeat = Some(frame.timestamp);
            }
        }
    }
}
