//! Reference-counted registry of workflow-scoped connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;

struct ScopedEntry {
    connection: Arc<Connection>,
    ref_count: u32,
}

/// Map of workflow ID to its dedicated connection plus consumer count.
///
/// The registry only tracks lifetimes; connecting and disconnecting the
/// underlying [`Connection`] is the caller's job.
pub(crate) struct ScopedRegistry {
    entries: Mutex<HashMap<String, ScopedEntry>>,
}

impl ScopedRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the connection for a workflow, creating it via `make` on first
    /// use. Returns the connection and whether it was just created.
    pub(crate) fn acquire(
        &self,
        workflow_id: &str,
        make: impl FnOnce() -> Arc<Connection>,
    ) -> (Arc<Connection>, bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(workflow_id) {
            entry.ref_count += 1;
            debug!(workflow_id, ref_count = entry.ref_count, "reusing scoped connection");
            return (Arc::clone(&entry.connection), false);
        }
        let connection = make();
        let _ = entries.insert(
            workflow_id.to_string(),
            ScopedEntry {
                connection: Arc::clone(&connection),
                ref_count: 1,
            },
        );
        debug!(workflow_id, "created scoped connection");
        (connection, true)
    }

    /// Release one reference. Returns the connection when the count reached
    /// zero and the entry was removed; the caller must tear it down.
    pub(crate) fn release(&self, workflow_id: &str) -> Option<Arc<Connection>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(workflow_id)?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            debug!(workflow_id, ref_count = entry.ref_count, "scoped connection still in use");
            return None;
        }
        entries.remove(workflow_id).map(|entry| entry.connection)
    }

    /// The connection for a workflow, when one exists.
    pub(crate) fn get(&self, workflow_id: &str) -> Option<Arc<Connection>> {
        self.entries
            .lock()
            .get(workflow_id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Current reference count for a workflow (0 when unknown).
    pub(crate) fn ref_count(&self, workflow_id: &str) -> u32 {
        self.entries
            .lock()
            .get(workflow_id)
            .map_or(0, |entry| entry.ref_count)
    }
}
