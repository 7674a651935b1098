//! Party registry.
//!
//! The registry owns every party and member and the directory that maps
//! connections onto them. It is a plain single-owner structure; callers
//! serialize access to it (see [`crate::Hub`]).

use rally_protocol::{PlayerInfo, PlayerState, StateFields};
use rally_transport::ConnectionId;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::codes::{self, CodeSource, RandomCodes};
use crate::directory::{Directory, Seat};
use crate::party::{Member, MemberId, Party, PartyCode};

/// Registry errors.
///
/// The display text is sent back to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The connection already belongs to a party.
    #[error("Already in a party")]
    AlreadyInParty,

    /// No live party has this code.
    #[error("Party not found")]
    PartyNotFound,

    /// The party is at capacity.
    #[error("Party is full")]
    PartyFull,
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum members per party.
    pub max_party_size: usize,
    /// Display names are cut to this many characters.
    pub max_name_len: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_party_size: 8,
            max_name_len: 20,
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub member_id: MemberId,
    pub code: PartyCode,
    pub color: String,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub member_id: MemberId,
    pub code: PartyCode,
    pub name: String,
    pub color: String,
    /// Members present before the join.
    pub existing: Vec<PlayerInfo>,
    /// Connections of the members present before the join.
    pub peers: Vec<ConnectionId>,
}

/// Result of removing a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub member_id: MemberId,
    pub code: PartyCode,
    /// Connections still in the party. Empty when the party dissolved.
    pub remaining: Vec<ConnectionId>,
}

impl Removed {
    /// Whether the party was deleted by this removal.
    #[must_use]
    pub fn dissolved(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live parties.
    pub party_count: usize,
    /// Number of members across all parties.
    pub member_count: usize,
}

/// Owner of all parties, members and the connection directory.
pub struct Registry {
    /// Parties indexed by code.
    parties: HashMap<PartyCode, Party>,
    /// Connection handle to seat.
    directory: Directory,
    /// Members created so far; the next id is this plus one.
    members_created: u64,
    codes: Box<dyn CodeSource>,
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_code_source(config, RandomCodes)
    }

    /// Create a new registry drawing join codes from `codes`.
    #[must_use]
    pub fn with_code_source(config: RegistryConfig, codes: impl CodeSource + 'static) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            parties: HashMap::new(),
            directory: Directory::new(),
            members_created: 0,
            codes: Box::new(codes),
            config,
        }
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            party_count: self.parties.len(),
            member_count: self.directory.len(),
        }
    }

    /// Create a party with the connection as its only member.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyInParty`] if the connection is seated.
    pub fn create_party(
        &mut self,
        connection: &ConnectionId,
        requested_name: Option<&str>,
    ) -> Result<Created, RegistryError> {
        if self.directory.contains(connection) {
            return Err(RegistryError::AlreadyInParty);
        }

        let code = self.unused_code();
        let member = self.new_member(connection, &code, requested_name);
        let created = Created {
            member_id: member.id,
            code: code.clone(),
            color: member.color.clone(),
        };

        let mut party = Party::new(code.clone());
        seat_member(&mut self.directory, &mut party, member);
        self.parties.insert(code.clone(), party);

        info!(code = %code, member = created.member_id, connection = %connection, "Party created");
        Ok(created)
    }

    /// Add the connection to the party with the given code.
    ///
    /// The code is trimmed and matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyInParty`] if the connection is seated,
    /// [`RegistryError::PartyNotFound`] for an unknown code and
    /// [`RegistryError::PartyFull`] if the party is at capacity.
    pub fn join_party(
        &mut self,
        connection: &ConnectionId,
        code: &str,
        requested_name: Option<&str>,
    ) -> Result<Joined, RegistryError> {
        if self.directory.contains(connection) {
            return Err(RegistryError::AlreadyInParty);
        }

        let code = codes::normalize_code(code);
        let party = self.parties.get(&code).ok_or(RegistryError::PartyNotFound)?;
        if party.len() >= self.config.max_party_size {
            return Err(RegistryError::PartyFull);
        }

        let existing = party.snapshot();
        let peers = party.connections();

        let member = self.new_member(connection, &code, requested_name);
        let joined = Joined {
            member_id: member.id,
            code: code.clone(),
            name: member.name.clone(),
            color: member.color.clone(),
            existing,
            peers,
        };

        if let Some(party) = self.parties.get_mut(&code) {
            seat_member(&mut self.directory, party, member);
        }

        debug!(
            code = %code,
            member = joined.member_id,
            connection = %connection,
            members = joined.existing.len() + 1,
            "Joined party"
        );
        Ok(joined)
    }

    /// Remove whatever member the connection resolves to.
    ///
    /// Deletes the party when its last member leaves. Returns `None` if the
    /// connection was not seated, so calling this twice is harmless.
    pub fn remove_by_connection(&mut self, connection: &ConnectionId) -> Option<Removed> {
        let seat = self.directory.unbind(connection)?;

        let party = self.parties.get_mut(&seat.party)?;
        party.remove(seat.member);
        let remaining = party.connections();

        if remaining.is_empty() {
            self.parties.remove(&seat.party);
            info!(code = %seat.party, "Party dissolved");
        } else {
            debug!(
                code = %seat.party,
                member = seat.member,
                members = remaining.len(),
                "Left party"
            );
        }

        Some(Removed {
            member_id: seat.member,
            code: seat.party,
            remaining,
        })
    }

    /// Look up the member behind a connection.
    #[must_use]
    pub fn resolve(&self, connection: &ConnectionId) -> Option<&Member> {
        let seat = self.directory.seat(connection)?;
        self.parties.get(&seat.party)?.get(seat.member)
    }

    /// Normalize and store the latest state of the connection's member.
    ///
    /// Returns the stored state, or `None` if the connection is not seated.
    pub fn update_state(
        &mut self,
        connection: &ConnectionId,
        fields: &StateFields,
    ) -> Option<PlayerState> {
        let seat = self.directory.seat(connection)?;
        let member = self.parties.get_mut(&seat.party)?.get_mut(seat.member)?;

        let state = PlayerState::normalize(fields);
        member.last_state = Some(state.clone());
        Some(state)
    }

    /// Look up a party by code.
    #[must_use]
    pub fn party(&self, code: &str) -> Option<&Party> {
        self.parties.get(code)
    }

    /// Connections of every member of a party.
    #[must_use]
    pub fn party_connections(&self, code: &str) -> Vec<ConnectionId> {
        self.parties
            .get(code)
            .map(Party::connections)
            .unwrap_or_default()
    }

    /// Get all party codes.
    #[must_use]
    pub fn party_codes(&self) -> Vec<PartyCode> {
        self.parties.keys().cloned().collect()
    }

    /// Draw codes until one is not in use.
    fn unused_code(&mut self) -> PartyCode {
        loop {
            let code = self.codes.next_code();
            if !self.parties.contains_key(&code) {
                return code;
            }
            debug!(code = %code, "Join code collision, retrying");
        }
    }

    fn new_member(
        &mut self,
        connection: &ConnectionId,
        code: &str,
        requested_name: Option<&str>,
    ) -> Member {
        self.members_created += 1;
        let id = self.members_created;

        let name = requested_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(codes::generate_name)
            .chars()
            .take(self.config.max_name_len)
            .collect();

        Member {
            id,
            name,
            color: codes::color_for(id).to_string(),
            connection: connection.clone(),
            party: code.to_string(),
            last_state: None,
        }
    }
}

/// Insert a member into its party and the directory in one step.
fn seat_member(directory: &mut Directory, party: &mut Party, member: Member) {
    directory.bind(
        member.connection.clone(),
        Seat {
            member: member.id,
            party: party.code().to_string(),
        },
    );
    party.insert(member);
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{HashSet, VecDeque};

    /// Hands out a fixed sequence of codes, then falls back to random ones.
    struct Scripted(VecDeque<&'static str>);

    impl CodeSource for Scripted {
        fn next_code(&mut self) -> String {
            self.0
                .pop_front()
                .map(str::to_string)
                .unwrap_or_else(codes::generate_code)
        }
    }

    fn scripted(script: &[&'static str]) -> Registry {
        Registry::with_code_source(
            RegistryConfig::default(),
            Scripted(script.iter().copied().collect()),
        )
    }

    fn conn(n: usize) -> ConnectionId {
        ConnectionId::new(format!("conn-{}", n))
    }

    #[test]
    fn test_create_party() {
        let mut registry = Registry::new();

        let created = registry.create_party(&conn(1), Some("Ada")).unwrap();
        assert_eq!(created.member_id, 1);
        assert_eq!(created.code.len(), 4);
        assert_eq!(created.color, codes::PALETTE[0]);

        let member = registry.resolve(&conn(1)).unwrap();
        assert_eq!(member.name, "Ada");
        assert_eq!(member.party, created.code);
        assert_eq!(registry.party(&created.code).unwrap().len(), 1);
        assert_eq!(
            registry.stats(),
            RegistryStats {
                party_count: 1,
                member_count: 1
            }
        );
    }

    #[test]
    fn test_create_twice_fails() {
        let mut registry = Registry::new();
        registry.create_party(&conn(1), None).unwrap();

        assert_eq!(
            registry.create_party(&conn(1), None),
            Err(RegistryError::AlreadyInParty)
        );
        assert_eq!(registry.stats().party_count, 1);
    }

    #[test]
    fn test_codes_unique_among_live_parties() {
        let mut registry = Registry::new();
        let mut seen = HashSet::new();

        for n in 0..300 {
            let created = registry.create_party(&conn(n), None).unwrap();
            assert!(seen.insert(created.code));
        }
        assert_eq!(registry.stats().party_count, 300);
    }

    #[test]
    fn test_code_collision_retries() {
        let mut registry = scripted(&["AAAA", "AAAA", "AAAA", "BBBB"]);

        assert_eq!(registry.create_party(&conn(1), None).unwrap().code, "AAAA");
        assert_eq!(registry.create_party(&conn(2), None).unwrap().code, "BBBB");
    }

    #[test]
    fn test_dissolved_code_can_be_reused() {
        let mut registry = scripted(&["AAAA", "AAAA"]);

        registry.create_party(&conn(1), None).unwrap();
        let removed = registry.remove_by_connection(&conn(1)).unwrap();
        assert!(removed.dissolved());
        assert!(registry.party("AAAA").is_none());
        assert!(registry.resolve(&conn(1)).is_none());

        assert_eq!(registry.create_party(&conn(2), None).unwrap().code, "AAAA");
    }

    #[test]
    fn test_join_party() {
        let mut registry = Registry::new();
        let created = registry.create_party(&conn(1), Some("Ada")).unwrap();

        let joined = registry
            .join_party(&conn(2), &created.code.to_lowercase(), Some("Bob"))
            .unwrap();
        assert_eq!(joined.member_id, 2);
        assert_eq!(joined.code, created.code);
        assert_eq!(joined.color, codes::PALETTE[1]);
        assert_eq!(joined.existing.len(), 1);
        assert_eq!(joined.existing[0].id, "1");
        assert_eq!(joined.existing[0].name, "Ada");
        assert_eq!(joined.peers, vec![conn(1)]);
        assert_eq!(registry.party(&created.code).unwrap().len(), 2);
    }

    #[test]
    fn test_join_trims_code() {
        let mut registry = scripted(&["K7PQ"]);
        registry.create_party(&conn(1), None).unwrap();

        assert!(registry.join_party(&conn(2), "  k7pq\n", None).is_ok());
    }

    #[test]
    fn test_join_errors() {
        let mut registry = Registry::new();
        let created = registry.create_party(&conn(1), None).unwrap();

        assert_eq!(
            registry.join_party(&conn(1), &created.code, None),
            Err(RegistryError::AlreadyInParty)
        );
        assert_eq!(
            registry.join_party(&conn(2), "ZZZZ0", None),
            Err(RegistryError::PartyNotFound)
        );
        assert_eq!(
            registry.join_party(&conn(2), "", None),
            Err(RegistryError::PartyNotFound)
        );
    }

    #[test]
    fn test_party_capacity() {
        let mut registry = Registry::new();
        let code = registry.create_party(&conn(0), None).unwrap().code;

        for n in 1..7 {
            registry.join_party(&conn(n), &code, None).unwrap();
        }
        assert_eq!(registry.party(&code).unwrap().len(), 7);

        // Seven members: the eighth fits.
        registry.join_party(&conn(7), &code, None).unwrap();
        assert_eq!(registry.party(&code).unwrap().len(), 8);

        // Eight members: the ninth does not.
        assert_eq!(
            registry.join_party(&conn(8), &code, None),
            Err(RegistryError::PartyFull)
        );
        assert_eq!(registry.party(&code).unwrap().len(), 8);
        assert!(registry.resolve(&conn(8)).is_none());
    }

    #[test]
    fn test_member_ids_never_reused() {
        let mut registry = Registry::new();
        let first = registry.create_party(&conn(1), None).unwrap();
        registry.remove_by_connection(&conn(1));

        let second = registry.create_party(&conn(2), None).unwrap();
        assert_eq!(first.member_id, 1);
        assert_eq!(second.member_id, 2);
    }

    #[test]
    fn test_failed_join_does_not_consume_id() {
        let mut registry = Registry::new();
        registry.create_party(&conn(1), None).unwrap();
        assert!(registry.join_party(&conn(2), "NOPE", None).is_err());

        let created = registry.create_party(&conn(2), None).unwrap();
        assert_eq!(created.member_id, 2);
    }

    #[test]
    fn test_names_default_and_truncate() {
        let mut registry = Registry::new();

        registry
            .create_party(&conn(1), Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"))
            .unwrap();
        assert_eq!(registry.resolve(&conn(1)).unwrap().name, "ABCDEFGHIJKLMNOPQRST");

        registry.create_party(&conn(2), Some("   ")).unwrap();
        let generated = &registry.resolve(&conn(2)).unwrap().name;
        assert!(!generated.is_empty());
        assert!(generated.chars().count() <= 20);

        registry.create_party(&conn(3), None).unwrap();
        assert!(!registry.resolve(&conn(3)).unwrap().name.is_empty());
    }

    #[test]
    fn test_remove_keeps_party_with_members() {
        let mut registry = Registry::new();
        let code = registry.create_party(&conn(1), None).unwrap().code;
        registry.join_party(&conn(2), &code, None).unwrap();

        let removed = registry.remove_by_connection(&conn(2)).unwrap();
        assert_eq!(removed.member_id, 2);
        assert_eq!(removed.remaining, vec![conn(1)]);
        assert!(!removed.dissolved());
        assert_eq!(registry.party(&code).unwrap().len(), 1);
        assert_eq!(registry.stats().member_count, 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        registry.create_party(&conn(1), None).unwrap();

        assert!(registry.remove_by_connection(&conn(1)).is_some());
        assert!(registry.remove_by_connection(&conn(1)).is_none());
        assert!(registry.remove_by_connection(&conn(99)).is_none());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_update_state() {
        let mut registry = Registry::new();
        let fields: StateFields = serde_json::from_value(json!({"x": "abc", "y": 2})).unwrap();

        assert!(registry.update_state(&conn(1), &fields).is_none());

        registry.create_party(&conn(1), None).unwrap();
        let state = registry.update_state(&conn(1), &fields).unwrap();
        assert_eq!(state.x, 0.0);
        assert_eq!(state.y, 2.0);
        assert_eq!(state.chap, 1.0);
        assert_eq!(registry.resolve(&conn(1)).unwrap().last_state, Some(state));
    }

    #[test]
    fn test_join_snapshot_includes_state() {
        let mut registry = Registry::new();
        let code = registry.create_party(&conn(1), None).unwrap().code;
        let fields: StateFields = serde_json::from_value(json!({"x": 3, "anim": "run"})).unwrap();
        registry.update_state(&conn(1), &fields);

        let joined = registry.join_party(&conn(2), &code, None).unwrap();
        let state = joined.existing[0].state.as_ref().unwrap();
        assert_eq!(state.x, 3.0);
        assert_eq!(state.anim, "run");
    }
}
