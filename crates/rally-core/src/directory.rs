//! Connection directory.
//!
//! Maps a live connection handle to the seat it occupies. The directory
//! never owns members; parties do. A seat is the key pair needed to find
//! the member inside its party.

use rally_transport::ConnectionId;
use std::collections::HashMap;

use crate::party::{MemberId, PartyCode};

/// Where a connection sits: which party, as which member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub member: MemberId,
    pub party: PartyCode,
}

/// Index from connection handle to seat.
#[derive(Debug, Default)]
pub struct Directory {
    seats: HashMap<ConnectionId, Seat>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the seat of a connection.
    ///
    /// Returns the previous seat if the connection already had one.
    pub fn bind(&mut self, connection: ConnectionId, seat: Seat) -> Option<Seat> {
        self.seats.insert(connection, seat)
    }

    /// Forget a connection, returning its seat.
    pub fn unbind(&mut self, connection: &ConnectionId) -> Option<Seat> {
        self.seats.remove(connection)
    }

    /// Look up the seat of a connection.
    #[must_use]
    pub fn seat(&self, connection: &ConnectionId) -> Option<&Seat> {
        self.seats.get(connection)
    }

    /// Check if a connection is seated.
    #[must_use]
    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.seats.contains_key(connection)
    }

    /// Number of seated connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Check if no connection is seated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}
