//! # rally-transport
//!
//! Transport-side plumbing for the Rally party relay.
//!
//! The core never touches sockets. It addresses connections by
//! [`ConnectionId`] and hands encoded messages to an [`Outbox`]. This crate
//! provides both, plus the [`PeerTable`] that backs an `Outbox` with one
//! outbound queue per connection and the heartbeat sweeper that probes them.
//!
//! ```rust,ignore
//! use rally_transport::{Outgoing, PeerTable};
//!
//! async fn writer(peers: &PeerTable, id: ConnectionId) {
//!     let mut rx = peers.register(id);
//!     while let Some(out) = rx.recv().await {
//!         // Write to the socket
//!     }
//! }
//! ```

pub mod heartbeat;
pub mod peers;
pub mod traits;

pub use heartbeat::{spawn_sweeper, SweepReport};
pub use peers::{Outgoing, PeerTable};
pub use traits::{ConnectionId, Outbox, TransportError};
