//! Registry of connected preview clients.
//!
//! The registry is owned by the relay task and is the only place that
//! knows which client channels exist. Each entry is the sending half of a
//! connection's outbound queue. A channel whose connection task has ended
//! reports itself closed and is pruned on the next broadcast.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use axum::extract::ws::Utf8Bytes;
use tracing::{debug, trace};

use crate::identifiers::ClientId;

// ============================================================================
// Outbound
// ============================================================================

/// Instruction for a connection's write half.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Send one text frame.
    Text(Utf8Bytes),
    /// Send a close frame and stop.
    Close,
}

// ============================================================================
// ClientHandle
// ============================================================================

/// Sending side of one client's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ClientHandle {
    /// Creates a handle and the receiver its connection task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `true` while the connection task is still draining the queue.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queues a text frame. Returns `false` if the connection is gone.
    #[inline]
    pub fn send_text(&self, text: Utf8Bytes) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    /// Asks the connection to close.
    #[inline]
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

// ============================================================================
// ClientRegistry
// ============================================================================

/// Set of currently connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: FxHashMap<ClientId, ClientHandle>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client to the open set.
    pub fn register(&mut self, client_id: ClientId, handle: ClientHandle) {
        self.clients.insert(client_id, handle);
        debug!(%client_id, clients = self.clients.len(), "Client registered");
    }

    /// Removes a client. Returns `false` if it was already gone.
    pub fn unregister(&mut self, client_id: ClientId) -> bool {
        let removed = self.clients.remove(&client_id).is_some();
        if removed {
            debug!(%client_id, clients = self.clients.len(), "Client unregistered");
        }
        removed
    }

    /// Returns `true` if the client is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Returns the number of registered clients.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Returns the IDs of all clients whose channel is open.
    #[must_use]
    pub fn open_clients(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|(_, handle)| handle.is_open())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Sends one frame to one client.
    ///
    /// Returns `false` if the client is unknown or its channel is closed.
    pub fn send_to(&self, client_id: ClientId, text: Utf8Bytes) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|handle| handle.send_text(text))
    }

    /// Sends the same frame to every open client.
    ///
    /// Closed channels are skipped and pruned. Returns how many clients
    /// the frame was queued for.
    pub fn broadcast(&mut self, text: &Utf8Bytes) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();

        for (client_id, handle) in &self.clients {
            if handle.send_text(text.clone()) {
                delivered += 1;
            } else {
                stale.push(*client_id);
            }
        }

        for client_id in stale {
            self.clients.remove(&client_id);
            debug!(%client_id, "Pruned closed client during broadcast");
        }

        trace!(delivered, bytes = text.len(), "Broadcast queued");
        delivered
    }

    /// Asks every client to close and empties the registry.
    pub fn close_all(&mut self) {
        for (_, handle) in self.clients.drain() {
            handle.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Utf8Bytes {
        Utf8Bytes::from(text.to_string())
    }

    fn expect_text(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> String {
        match rx.try_recv().expect("frame queued") {
            Outbound::Text(text) => text.as_str().to_string(),
            Outbound::Close => panic!("unexpected close"),
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ClientRegistry::new();
        let id = ClientId::next();
        let (handle, _rx) = ClientHandle::channel();

        registry.register(id, handle);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_open_client() {
        let mut registry = ClientRegistry::new();
        let (a, mut rx_a) = ClientHandle::channel();
        let (b, mut rx_b) = ClientHandle::channel();
        registry.register(ClientId::next(), a);
        registry.register(ClientId::next(), b);

        let delivered = registry.broadcast(&frame(r#"{"type":"content","content":"X:1"}"#));

        assert_eq!(delivered, 2);
        assert_eq!(expect_text(&mut rx_a), r#"{"type":"content","content":"X:1"}"#);
        assert_eq!(expect_text(&mut rx_b), r#"{"type":"content","content":"X:1"}"#);
    }

    #[test]
    fn test_broadcast_skips_and_prunes_closed_clients() {
        let mut registry = ClientRegistry::new();
        let open_id = ClientId::next();
        let closed_id = ClientId::next();
        let (open, mut rx_open) = ClientHandle::channel();
        let (closed, rx_closed) = ClientHandle::channel();
        registry.register(open_id, open);
        registry.register(closed_id, closed);

        drop(rx_closed);
        assert_eq!(registry.open_clients(), vec![open_id]);

        let delivered = registry.broadcast(&frame("{}"));

        assert_eq!(delivered, 1);
        assert_eq!(expect_text(&mut rx_open), "{}");
        assert!(!registry.contains(closed_id));
        assert!(registry.contains(open_id));
    }

    #[test]
    fn test_unregistered_client_gets_nothing() {
        let mut registry = ClientRegistry::new();
        let id = ClientId::next();
        let (handle, mut rx) = ClientHandle::channel();
        registry.register(id, handle);
        registry.unregister(id);

        assert_eq!(registry.broadcast(&frame("{}")), 0);
        assert!(rx.try_recv().is_err());
        assert!(!registry.send_to(id, frame("{}")));
    }

    #[test]
    fn test_close_all_sends_close() {
        let mut registry = ClientRegistry::new();
        let (handle, mut rx) = ClientHandle::channel();
        registry.register(ClientId::next(), handle);

        registry.close_all();

        assert!(registry.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }
}
