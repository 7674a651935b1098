//! Connection handles and the delivery capability used by the core.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Process-wide counter so handles are never reused.
static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID, never handed out before in this process.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// No connection registered under this handle.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// Outbound delivery to connections.
///
/// Delivery is best-effort and must never block: a closed or slow recipient
/// may drop the message, and that never affects other recipients.
pub trait Outbox: Send + Sync {
    /// Send an encoded message to one connection.
    fn send_to(&self, connection: &ConnectionId, payload: Bytes);

    /// Send an encoded message to every listed connection except `except`.
    fn broadcast_except(
        &self,
        connections: &[ConnectionId],
        except: Option<&ConnectionId>,
        payload: Bytes,
    ) {
        for connection in connections {
            if Some(connection) != except {
                self.send_to(connection, payload.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Outbox for Collect {
        fn send_to(&self, connection: &ConnectionId, _payload: Bytes) {
            self.0.lock().unwrap().push(connection.to_string());
        }
    }

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
    }

    #[test]
    fn test_broadcast_except_skips_excluded() {
        let outbox = Collect::default();
        let conns: Vec<ConnectionId> = vec!["a".into(), "b".into(), "c".into()];

        outbox.broadcast_except(&conns, Some(&"b".into()), Bytes::from_static(b"{}"));
        assert_eq!(*outbox.0.lock().unwrap(), vec!["a", "c"]);

        outbox.0.lock().unwrap().clear();
        outbox.broadcast_except(&conns, None, Bytes::from_static(b"{}"));
        assert_eq!(outbox.0.lock().unwrap().len(), 3);
    }
}
