//! Handler registry and inbound-frame dispatch.
//!
//! Each connection owns its own registry, so workflow isolation is
//! structural: a frame arriving on one connection can only ever reach the
//! handlers registered on that connection.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_events::{InboundEvent, MessageEnvelope};
use tracing::{error, trace, warn};

/// Callback invoked for every matching inbound event.
pub type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Per-connection map from event type to registered handlers.
pub(crate) struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler; returns its registration ID.
    pub(crate) fn add(&self, event_type: &str, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove exactly one handler; drops the event-type entry when empty.
    pub(crate) fn remove(&self, event_type: &str, id: u64) {
        let mut handlers = self.handlers.lock();
        if let Some(entries) = handlers.get_mut(event_type) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                let _ = handlers.remove(event_type);
            }
        }
    }

    /// Snapshot the handlers for an event type (copy-on-iterate: dispatch
    /// walks the snapshot, so a handler unsubscribing mid-dispatch cannot
    /// corrupt the loop).
    pub(crate) fn snapshot(&self, event_type: &str) -> Vec<Handler> {
        self.handlers
            .lock()
            .get(event_type)
            .map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default()
    }
}

/// Idempotent handle for removing a registered handler.
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    event_type: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(registry: Weak<HandlerRegistry>, event_type: String, id: u64) -> Self {
        Self {
            registry,
            event_type,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Remove the handler. Calling this more than once is a no-op; dropping
    /// the subscription without calling it leaves the handler registered.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(&self.event_type, self.id);
            }
        }
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Parse, normalize, and dispatch one inbound text frame.
///
/// Malformed JSON is logged and dropped. Handler panics are caught
/// per-handler so one faulty subscriber never blocks delivery to the rest.
pub(crate) fn dispatch_text(registry: &HandlerRegistry, scope: &str, text: &str) {
    let envelope = match MessageEnvelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(scope, error = %e, "dropping malformed frame");
            return;
        }
    };

    let event = InboundEvent::from_envelope(&envelope);
    let handlers = registry.snapshot(&event.event_type);
    if handlers.is_empty() {
        trace!(scope, event_type = %event.event_type, "no subscribers");
        return;
    }

    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
            error!(scope, event_type = %event.event_type, "subscriber panicked during dispatch");
        }
    }
}
