//! The serialization point between connections and the registry.
//!
//! Every inbound message and every disconnect for every connection goes
//! through one lock around the [`Registry`], and its outbound messages are
//! handed to the [`Outbox`] before the lock is released. Code generation,
//! capacity checks and membership changes therefore never interleave.

use rally_protocol::codec;
use rally_transport::{ConnectionId, Outbox};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

use crate::registry::{Registry, RegistryConfig, RegistryStats};
use crate::router::{Outbound, RouterConfig, SessionRouter};

/// Shared entry point for all connection activity.
pub struct Hub {
    registry: Mutex<Registry>,
    router: SessionRouter,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default(), RouterConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(registry: RegistryConfig, router: RouterConfig) -> Self {
        Self::with_registry(Registry::with_config(registry), router)
    }

    /// Create a hub around an existing registry.
    #[must_use]
    pub fn with_registry(registry: Registry, router: RouterConfig) -> Self {
        Self {
            registry: Mutex::new(registry),
            router: SessionRouter::with_config(router),
        }
    }

    /// Process one raw inbound message.
    ///
    /// Returns the number of messages handed to the outbox.
    pub fn handle(&self, connection: &ConnectionId, raw: &[u8], outbox: &dyn Outbox) -> usize {
        let mut registry = self.lock();
        let outbound = self.router.route(&mut registry, connection, raw);
        deliver(outbound, outbox)
    }

    /// Connection lifecycle hook, run once the transport sees a close or error.
    ///
    /// Idempotent: a second call for the same connection does nothing.
    pub fn disconnect(&self, connection: &ConnectionId, outbox: &dyn Outbox) -> usize {
        let mut registry = self.lock();
        let outbound = self.router.disconnect(&mut registry, connection);
        deliver(outbound, outbox)
    }

    /// Snapshot of party and member counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.lock().stats()
    }

    /// Run a read-only closure against the registry.
    pub fn inspect<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panic mid-dispatch leaves the maps consistent: every mutation is
        // a single insert or remove.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode each message once and hand it to the outbox.
fn deliver(outbound: Vec<Outbound>, outbox: &dyn Outbox) -> usize {
    let mut sent = 0;

    for out in outbound {
        let payload = match codec::encode(out.message()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, kind = out.message().kind().as_str(), "Failed to encode message");
                continue;
            }
        };

        match out {
            Outbound::Reply { to, .. } => {
                outbox.send_to(&to, payload);
                sent += 1;
            }
            Outbound::Broadcast {
                recipients, except, ..
            } => {
                trace!(recipients = recipients.len(), "Broadcast");
                outbox.broadcast_except(&recipients, except.as_ref(), payload);
                sent += 1;
            }
        }
    }

    sent
}
