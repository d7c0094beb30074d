//! End-to-end tests for the connection manager over a scripted transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use tether_client::events::{MessageEnvelope, outbound};
use tether_client::transport::{Transport, TransportEvent, TransportSink};
use tether_client::{ClientConfig, ClientError, ConnectionManager, ConnectionStatus};

// ---------------------------------------------------------------------------
// Scripted transport double
// ---------------------------------------------------------------------------

struct FakeSink {
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
}

impl FakeSink {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }
    }
}

impl TransportSink for FakeSink {
    fn send(&self, text: String) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(text);
        true
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

struct FakeConn {
    url: String,
    sink: Arc<FakeSink>,
    events: mpsc::Sender<TransportEvent>,
}

impl FakeConn {
    fn push_text(&self, text: &str) {
        let _ = self.events.try_send(TransportEvent::Message(text.to_string()));
    }

    fn close(&self, code: Option<u16>) {
        self.sink.close();
        let _ = self.events.try_send(TransportEvent::Closed { code });
    }

    fn sent(&self) -> Vec<String> {
        self.sink.sent.lock().clone()
    }
}

#[derive(Default)]
struct FakeTransport {
    conns: Mutex<Vec<Arc<FakeConn>>>,
    attempts: AtomicUsize,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The most recent connection whose URL contains `fragment`.
    fn conn_for(&self, fragment: &str) -> Arc<FakeConn> {
        self.conns
            .lock()
            .iter()
            .rev()
            .find(|conn| conn.url.contains(fragment))
            .map(Arc::clone)
            .unwrap_or_else(|| panic!("no connection matching {fragment:?}"))
    }

    /// The most recent connection opened to exactly `url`.
    fn conn_exact(&self, url: &str) -> Arc<FakeConn> {
        self.conns
            .lock()
            .iter()
            .rev()
            .find(|conn| conn.url == url)
            .map(Arc::clone)
            .unwrap_or_else(|| panic!("no connection to {url:?}"))
    }
}

const GLOBAL_URL: &str = "ws://backend:4420/ws";

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportSink>, mpsc::Receiver<TransportEvent>), ClientError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(32);
        let sink = Arc::new(FakeSink::new());
        let conn = Arc::new(FakeConn {
            url: url.to_string(),
            sink: Arc::clone(&sink),
            events: tx,
        });
        self.conns.lock().push(conn);
        Ok((sink, rx))
    }
}

fn make_manager(transport: &Arc<FakeTransport>) -> ConnectionManager {
    let config = ClientConfig {
        base_url: GLOBAL_URL.into(),
        ..ClientConfig::default()
    };
    ConnectionManager::with_transport(config, Arc::clone(transport) as Arc<dyn Transport>)
}

/// Let spawned driver tasks run on the current-thread test runtime.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn counting_handler(counter: &Arc<AtomicUsize>) -> impl Fn(&tether_client::events::InboundEvent) + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_event| {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Reference counting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn refcounted_workflow_lifecycle() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);

    manager.connect_to_workflow("wf-x");
    settle().await;
    manager.connect_to_workflow("wf-x");
    settle().await;

    // Two acquires, one socket.
    assert_eq!(transport.attempts(), 1);
    assert_eq!(manager.workflow_ref_count("wf-x"), 2);
    assert_eq!(manager.workflow_connection_status("wf-x"), ConnectionStatus::Connected);

    manager.disconnect_workflow("wf-x");
    assert_eq!(manager.workflow_ref_count("wf-x"), 1);
    assert_eq!(manager.workflow_connection_status("wf-x"), ConnectionStatus::Connected);

    manager.disconnect_workflow("wf-x");
    assert_eq!(manager.workflow_ref_count("wf-x"), 0);
    assert_eq!(manager.workflow_connection_status("wf-x"), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn workflow_url_is_scoped() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);

    manager.connect_to_workflow("wf-42");
    settle().await;

    let conn = transport.conn_for("wf-42");
    assert_eq!(conn.url, "ws://backend:4420/ws/workflow/wf-42/events");
}

#[tokio::test(start_paused = true)]
async fn unknown_workflow_reports_disconnected() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    assert_eq!(
        manager.workflow_connection_status("never-connected"),
        ConnectionStatus::Disconnected
    );
    assert_eq!(manager.workflow_ref_count("never-connected"), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_workflow_survives_extra_calls() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-x");
    settle().await;

    manager.disconnect_workflow("wf-x");
    manager.disconnect_workflow("wf-x");
    manager.disconnect_workflow("wf-x");
    assert_eq!(manager.workflow_ref_count("wf-x"), 0);
}

// ---------------------------------------------------------------------------
// Workflow isolation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn frames_stay_on_their_workflow() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);

    manager.connect_to_workflow("wf-a");
    settle().await;
    manager.connect_to_workflow("wf-b");
    settle().await;

    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));
    let sub_a = manager
        .subscribe_to_workflow("wf-a", "terminal.status_changed", counting_handler(&hits_a))
        .unwrap();
    let _sub_b = manager
        .subscribe_to_workflow("wf-b", "terminal.status_changed", counting_handler(&hits_b))
        .unwrap();

    let frame = r#"{"type": "terminal.status_changed", "payload": {"workflowId": "wf-a", "terminalId": "t", "status": "running"}}"#;
    transport.conn_for("wf-a").push_text(frame);
    settle().await;

    // Same event type subscribed on both; only A's handlers fire.
    assert_eq!(hits_a.load(Ordering::SeqCst), 1);
    assert_eq!(hits_b.load(Ordering::SeqCst), 0);

    sub_a.unsubscribe();
    transport.conn_for("wf-a").push_text(frame);
    settle().await;
    assert_eq!(hits_a.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn global_subscribers_do_not_see_workflow_frames() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);

    manager.connect(GLOBAL_URL);
    settle().await;
    manager.connect_to_workflow("wf-a");
    settle().await;

    let global_hits = Arc::new(AtomicUsize::new(0));
    let _sub = manager.subscribe("git.push", counting_handler(&global_hits));

    transport
        .conn_for("wf-a")
        .push_text(r#"{"type": "git.push", "payload": {}}"#);
    settle().await;
    assert_eq!(global_hits.load(Ordering::SeqCst), 0);

    transport
        .conn_exact(GLOBAL_URL)
        .push_text(r#"{"type": "git.push", "payload": {}}"#);
    settle().await;
    assert_eq!(global_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn subscribe_to_unknown_workflow_errors() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    let result = manager.subscribe_to_workflow("wf-missing", "git.push", |_event| {});
    assert!(matches!(
        result,
        Err(ClientError::UnknownWorkflow { workflow_id }) if workflow_id == "wf-missing"
    ));
}

// ---------------------------------------------------------------------------
// Send routing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn explicit_workflow_id_pins_routing() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;
    manager.connect_to_workflow("wf-b");
    settle().await;

    let envelope = outbound::terminal_input("wf-a", "term-1", "ls\n");
    assert!(manager.send(&envelope));

    let sent_a = transport.conn_for("wf-a").sent();
    assert_eq!(sent_a.len(), 1);
    assert!(sent_a[0].contains("terminal.input"));
    assert!(transport.conn_for("wf-b").sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_to_closed_workflow_never_falls_back() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;
    manager.connect_to_workflow("wf-b");
    settle().await;

    // Drop A's socket; B stays open and is the most recent context.
    transport.conn_for("wf-a").close(Some(1006));
    settle().await;
    assert_eq!(manager.workflow_connection_status("wf-a"), ConnectionStatus::Reconnecting);

    let envelope = outbound::terminal_input("wf-a", "term-1", "ls\n");
    assert!(!manager.send(&envelope));
    assert!(transport.conn_for("wf-b").sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_to_absent_workflow_returns_false() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect(GLOBAL_URL);
    settle().await;

    let envelope = outbound::terminal_input("wf-ghost", "term-1", "ls\n");
    assert!(!manager.send(&envelope));
    assert!(transport.conn_exact(GLOBAL_URL).sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn snake_case_workflow_id_also_pins_routing() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;

    let envelope = MessageEnvelope::new(
        "terminal.input",
        json!({"workflow_id": "wf-a", "terminal_id": "term-1", "data": "ls\n"}),
    );
    assert!(manager.send(&envelope));
    assert_eq!(transport.conn_for("wf-a").sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn contextless_send_uses_current_workflow() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect(GLOBAL_URL);
    settle().await;
    manager.connect_to_workflow("wf-a");
    settle().await;

    // No workflowId in the payload: goes to the current workflow (wf-a).
    let envelope = MessageEnvelope::new("terminal.resize", json!({"cols": 80, "rows": 24}));
    assert!(manager.send(&envelope));
    assert_eq!(transport.conn_for("wf-a").sent().len(), 1);
    assert!(transport.conn_exact(GLOBAL_URL).sent().is_empty());

    // Clearing the context routes to the global connection.
    manager.set_current_workflow(None);
    assert!(manager.send(&envelope));
    assert_eq!(transport.conn_exact(GLOBAL_URL).sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_clears_current_workflow() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;
    assert_eq!(manager.current_workflow().as_deref(), Some("wf-a"));

    manager.disconnect_workflow("wf-a");
    assert_eq!(manager.current_workflow(), None);
}

#[tokio::test(start_paused = true)]
async fn prompt_response_routes_to_its_workflow() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;
    manager.connect_to_workflow("wf-b");
    settle().await;

    assert!(manager.send_prompt_response("wf-a", "term-7", "y"));

    let sent = transport.conn_for("wf-a").sent();
    assert_eq!(sent.len(), 1);
    let envelope = MessageEnvelope::parse(&sent[0]).unwrap();
    assert_eq!(envelope.event_type, "terminal.prompt_response");
    assert_eq!(envelope.payload["workflowId"], "wf-a");
    assert_eq!(envelope.payload["terminalId"], "term-7");
    assert_eq!(envelope.payload["response"], "y");
    assert!(transport.conn_for("wf-b").sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn prompt_response_to_closed_workflow_fails() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect_to_workflow("wf-a");
    settle().await;

    transport.conn_for("wf-a").close(Some(1006));
    settle().await;
    assert!(!manager.send_prompt_response("wf-a", "term-7", "y"));
}

// ---------------------------------------------------------------------------
// Global connection status surface
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn global_status_transitions() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    assert_eq!(manager.connection_status(), ConnectionStatus::Disconnected);

    manager.connect(GLOBAL_URL);
    assert_eq!(manager.connection_status(), ConnectionStatus::Connecting);
    settle().await;
    assert_eq!(manager.connection_status(), ConnectionStatus::Connected);
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.disconnect();
    assert_eq!(manager.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_surfaces_through_manager() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect(GLOBAL_URL);
    settle().await;
    assert!(manager.last_heartbeat().is_none());

    tokio::time::advance(std::time::Duration::from_secs(30)).await;
    settle().await;

    assert!(manager.last_heartbeat().is_some());
    let sent = transport.conn_exact(GLOBAL_URL).sent();
    assert_eq!(sent.len(), 1);
    let envelope = MessageEnvelope::parse(&sent[0]).unwrap();
    assert_eq!(envelope.event_type, "system.heartbeat");
    assert_eq!(envelope.payload, json!({}));
}

#[tokio::test(start_paused = true)]
async fn handler_panic_does_not_break_the_connection() {
    let transport = FakeTransport::new();
    let manager = make_manager(&transport);
    manager.connect(GLOBAL_URL);
    settle().await;

    let hits = Arc::new(AtomicUsize::new(0));
    let _bad = manager.subscribe("git.push", |_event| panic!("faulty subscriber"));
    let _good = manager.subscribe("git.push", counting_handler(&hits));

    let conn = transport.conn_exact(GLOBAL_URL);
    conn.push_text(r#"{"type": "git.push", "payload": {}}"#);
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The connection is still healthy afterwards.
    assert_eq!(manager.connection_status(), ConnectionStatus::Connected);
    conn.push_text(r#"{"type": "git.push", "payload": {}}"#);
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
