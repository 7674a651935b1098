//! Parties and their members.

use rally_protocol::{PlayerInfo, PlayerState};
use rally_transport::ConnectionId;
use std::collections::HashMap;

/// Member identifier, unique for the process lifetime.
pub type MemberId = u64;

/// A party join code.
pub type PartyCode = String;

/// A connected client inside a party.
///
/// Everything except `last_state` is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub color: String,
    pub connection: ConnectionId,
    pub party: PartyCode,
    pub last_state: Option<PlayerState>,
}

impl Member {
    /// Public view of this member.
    #[must_use]
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.to_string(),
            name: self.name.clone(),
            color: self.color.clone(),
            state: self.last_state.clone(),
        }
    }
}

/// A group of members sharing a join code.
#[derive(Debug)]
pub struct Party {
    code: PartyCode,
    members: HashMap<MemberId, Member>,
}

impl Party {
    /// Create an empty party.
    #[must_use]
    pub fn new(code: impl Into<PartyCode>) -> Self {
        Self {
            code: code.into(),
            members: HashMap::new(),
        }
    }

    /// Get the join code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the party has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member.
    pub fn insert(&mut self, member: Member) {
        self.members.insert(member.id, member);
    }

    /// Remove a member.
    pub fn remove(&mut self, id: MemberId) -> Option<Member> {
        self.members.remove(&id)
    }

    /// Get a member.
    #[must_use]
    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Get a member mutably.
    pub fn get_mut(&mut self, id: MemberId) -> Option<&mut Member> {
        self.members.get_mut(&id)
    }

    /// Iterate over the members, in no particular order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Connection handles of every member.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.values().map(|m| m.connection.clone()).collect()
    }

    /// Public view of every member.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PlayerInfo> {
        self.members.values().map(Member::info).collect()
    }
}
