//! Per-connection outbound queues.
//!
//! Each live connection owns an unbounded queue drained by its writer task.
//! Pushing never blocks, so one slow socket cannot stall a broadcast.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{ConnectionId, Outbox, TransportError};

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Encoded message to write as a text frame.
    Payload(Bytes),
    /// Liveness probe.
    Ping,
    /// Terminate the connection.
    Close,
}

/// A registered connection.
#[derive(Debug)]
pub(crate) struct Peer {
    pub(crate) sender: mpsc::UnboundedSender<Outgoing>,
    /// Cleared by each sweep, set again by any inbound traffic.
    pub(crate) alive: AtomicBool,
}

/// Table of live connections and their outbound queues.
#[derive(Debug, Default)]
pub struct PeerTable {
    pub(crate) peers: DashMap<ConnectionId, Peer>,
}

impl PeerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the queue its writer should drain.
    ///
    /// Registering an existing handle replaces its queue.
    pub fn register(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<Outgoing> {
        let (sender, receiver) = mpsc::unbounded_channel();
        debug!(connection = %id, "Peer registered");
        self.peers.insert(
            id,
            Peer {
                sender,
                alive: AtomicBool::new(true),
            },
        );
        receiver
    }

    /// Remove a connection.
    ///
    /// Returns `true` if it was registered.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.peers.remove(id).is_some();
        if removed {
            debug!(connection = %id, "Peer removed");
        }
        removed
    }

    /// Record inbound traffic from a connection.
    pub fn mark_alive(&self, id: &ConnectionId) {
        if let Some(peer) = self.peers.get(id) {
            peer.alive.store(true, Ordering::Relaxed);
        }
    }

    /// Queue a work item for a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or its writer has gone away.
    pub fn push(&self, id: &ConnectionId, item: Outgoing) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get(id)
            .ok_or_else(|| TransportError::UnknownConnection(id.clone()))?;

        peer.sender
            .send(item)
            .map_err(|_| TransportError::ConnectionClosed(id.clone()))
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    /// Get the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Outbox for PeerTable {
    fn send_to(&self, connection: &ConnectionId, payload: Bytes) {
        if let Err(e) = self.push(connection, Outgoing::Payload(payload)) {
            trace!(error = %e, "Send dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_send() {
        let peers = PeerTable::new();
        let id = ConnectionId::new("conn-1");
        let mut rx = peers.register(id.clone());
        assert!(peers.contains(&id));
        assert_eq!(peers.len(), 1);

        peers.send_to(&id, Bytes::from_static(b"hello"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outgoing::Payload(Bytes::from_static(b"hello"))
        );
    }

    #[test]
    fn test_send_to_unknown_is_swallowed() {
        let peers = PeerTable::new();
        peers.send_to(&"ghost".into(), Bytes::from_static(b"x"));
        assert!(matches!(
            peers.push(&"ghost".into(), Outgoing::Ping),
            Err(TransportError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_send_after_writer_dropped() {
        let peers = PeerTable::new();
        let id = ConnectionId::new("conn-1");
        let rx = peers.register(id.clone());
        drop(rx);

        // Still swallowed by the Outbox path.
        peers.send_to(&id, Bytes::from_static(b"x"));
        assert!(matches!(
            peers.push(&id, Outgoing::Ping),
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn test_dead_recipient_does_not_block_others() {
        let peers = PeerTable::new();
        let dead = ConnectionId::new("dead");
        let live = ConnectionId::new("live");
        drop(peers.register(dead.clone()));
        let mut rx = peers.register(live.clone());

        peers.broadcast_except(&[dead, live], None, Bytes::from_static(b"hi"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_remove() {
        let peers = PeerTable::new();
        let id = ConnectionId::new("conn-1");
        let _rx = peers.register(id.clone());

        assert!(peers.remove(&id));
        assert!(!peers.remove(&id));
        assert!(peers.is_empty());
    }
}
