//! Process-wide co-op party table.
//!
//! The only state shared between rooms. Rooms insert their party when they
//! are created for an inviter and remove it when they are disposed.

use crate::room::RoomId;
use arena_shared::MatchPhase;
use dashmap::DashMap;
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyEntry {
    pub room_id: RoomId,
    pub inviter: String,
    pub members: Vec<String>,
    pub phase: MatchPhase,
}

#[derive(Debug, Default)]
pub struct PartyRegistry {
    parties: DashMap<String, PartyEntry>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a party hosted in `room_id` with `inviter` as its first member.
    /// An existing entry under the same key is replaced.
    pub fn register(&self, party_key: &str, room_id: RoomId, inviter: &str) {
        debug!("Party {} registered in room {} by {}", party_key, room_id, inviter);
        self.parties.insert(
            party_key.to_string(),
            PartyEntry {
                room_id,
                inviter: inviter.to_string(),
                members: vec![inviter.to_string()],
                phase: MatchPhase::Waiting,
            },
        );
    }

    pub fn add_member(&self, party_key: &str, user_id: &str) -> bool {
        match self.parties.get_mut(party_key) {
            Some(mut entry) => {
                if !entry.members.iter().any(|m| m == user_id) {
                    entry.members.push(user_id.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn set_phase(&self, party_key: &str, phase: MatchPhase) {
        if let Some(mut entry) = self.parties.get_mut(party_key) {
            entry.phase = phase;
        }
    }

    /// True when someone other than `user_id` opened this party and is still
    /// waiting for a partner.
    pub fn is_inviter_waiting(&self, party_key: &str, user_id: &str) -> bool {
        self.parties
            .get(party_key)
            .map(|entry| {
                entry.inviter != user_id
                    && entry.phase == MatchPhase::Waiting
                    && entry.members.len() < 2
            })
            .unwrap_or(false)
    }

    pub fn room_of(&self, party_key: &str) -> Option<RoomId> {
        self.parties.get(party_key).map(|entry| entry.room_id)
    }

    pub fn get(&self, party_key: &str) -> Option<PartyEntry> {
        self.parties.get(party_key).map(|entry| entry.value().clone())
    }

    /// Best-effort cleanup of every party hosted by a disposed room.
    pub fn remove_room(&self, room_id: RoomId) -> usize {
        let before = self.parties.len();
        self.parties.retain(|_, entry| entry.room_id != room_id);
        before - self.parties.len()
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}
