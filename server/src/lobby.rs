//! Membership registry for the single shared lobby
//!
//! This module tracks every joined session and owns the leader invariant:
//! - exactly one member is leader whenever the lobby is non-empty
//! - the first member to join an empty lobby becomes leader
//! - when the leader leaves, the earliest-joined survivor takes over
//!
//! Members are kept in insertion order, which is both the roster order sent
//! to clients and the tie-break for leader succession.

use crate::session::{Outbound, Session};
use indexmap::IndexMap;
use log::info;
use shared::RosterEntry;
use thiserror::Error;

/// Returned when an identity is already held by a live session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identity {0} is already in the lobby")]
pub struct DuplicateIdentity(pub String);

/// The lobby's member table
#[derive(Debug, Default)]
pub struct LobbyRegistry {
    /// Joined sessions keyed by identity, in join order
    members: IndexMap<String, Session>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self {
            members: IndexMap::new(),
        }
    }

    /// Registers a session under `identity`
    ///
    /// Fails without touching the registry if the identity is taken. The
    /// session's leader flag is set here so that the first member of an
    /// empty lobby always leads and nobody else does on entry.
    pub fn join(
        &mut self,
        identity: String,
        mut session: Session,
    ) -> Result<(), DuplicateIdentity> {
        if self.members.contains_key(&identity) {
            return Err(DuplicateIdentity(identity));
        }

        session.leader = self.members.is_empty();
        info!("client connected: {}", identity);
        self.members.insert(identity, session);
        Ok(())
    }

    /// Removes a member, returning whether it held leadership
    ///
    /// Survivors keep their relative order. Leadership is not reassigned
    /// here; callers follow up with [`LobbyRegistry::promote_next`].
    pub fn leave(&mut self, identity: &str) -> Option<bool> {
        let session = self.members.shift_remove(identity)?;
        info!("client disconnected: {}", identity);
        Some(session.leader)
    }

    /// Makes the earliest-joined member the leader
    ///
    /// Returns the new leader's identity, or None for an empty lobby.
    pub fn promote_next(&mut self) -> Option<String> {
        for session in self.members.values_mut() {
            session.leader = false;
        }

        let (identity, session) = self.members.first_mut()?;
        session.leader = true;
        info!("client promoted to leader: {}", identity);
        Some(identity.clone())
    }

    /// Current roster in join order
    pub fn roster_snapshot(&self) -> Vec<RosterEntry> {
        self.members.values().map(Session::roster_entry).collect()
    }

    /// Delivery handles for every member, taken at call time
    pub fn recipients(&self) -> Vec<Outbound> {
        self.members
            .values()
            .map(|session| session.outbound().clone())
            .collect()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Session> {
        self.members.get(identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut Session> {
        self.members.get_mut(identity)
    }

    /// Identity of the current leader
    pub fn leader(&self) -> Option<&str> {
        self.members
            .values()
            .find(|session| session.leader)
            .map(|session| session.identity.as_str())
    }

    /// Returns the number of joined members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nobody is in the lobby
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
