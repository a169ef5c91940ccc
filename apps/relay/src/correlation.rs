//! Request correlation table
//!
//! Maps the ID of every in-flight public request on a tunnel to the queue its
//! handler is waiting on. An entry is removed exactly once: by the session
//! reader when the agent ends the response, by `close_all` on teardown, or by
//! the [`Listener`] itself when the handler goes away first.

use bytes::Bytes;
use dashmap::DashMap;
use porthole_common::{RequestId, ResponseHead};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Frames from the agent, as seen by the handler serving one public request
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Response(ResponseHead),
    Data(Bytes),
    ProxyError(String),
}

type Entries = Arc<DashMap<RequestId, mpsc::UnboundedSender<ListenerEvent>>>;

/// Per-tunnel table of in-flight requests
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_id: AtomicU64,
    entries: Entries,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request ID and register a listener for it
    ///
    /// IDs come from a per-tunnel counter, so they never repeat while the
    /// tunnel lives.
    pub fn open(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.insert(id, tx);

        Listener {
            id,
            rx,
            entries: self.entries.clone(),
        }
    }

    /// Hand an event to the listener for `id`
    ///
    /// Never waits: a handler that stops reading only grows its own queue, so
    /// the session reader keeps serving every other request on the tunnel.
    /// Returns false when no listener is registered or it has gone away; that
    /// is not an error.
    pub fn deliver(&self, id: RequestId, event: ListenerEvent) -> bool {
        let Some(tx) = self.entries.get(&id).map(|entry| entry.value().clone()) else {
            debug!("Dropping frame for unknown request {}", id);
            return false;
        };

        if tx.send(event).is_err() {
            debug!("Listener for request {} is gone", id);
            self.finish(id);
            return false;
        }
        true
    }

    /// Remove the listener for `id`, ending its event stream
    pub fn finish(&self, id: RequestId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop every listener so all waiting handlers unblock
    pub fn close_all(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receiving side of one correlation entry; unregisters itself on drop
#[derive(Debug)]
pub struct Listener {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<ListenerEvent>,
    entries: Entries,
}

impl Listener {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Next event in arrival order; `None` once the entry has been removed
    /// and every queued event was consumed
    pub async fn recv(&mut self) -> Option<ListenerEvent> {
        self.rx.recv().await
    }

    /// Remove the entry now; later frames for this ID are dropped
    pub fn finish(&self) {
        self.entries.remove(&self.id);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.finish();
    }
}
