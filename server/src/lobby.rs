//! Join routing.
//!
//! The lobby verifies a connecting session, loads its rating profile and
//! seats it in a room: the first waiting room of the requested mode for
//! duels and open co-op, the inviter's room for a co-op party, and a fresh
//! room for every survival run.

use crate::auth::{SessionVerifier, VerifiedSession};
use crate::config::RoomConfig;
use crate::driver::{reject, spawn_room, RoomHandle, RoomServices};
use crate::room::{MatchRoom, RoomId};
use crate::store::RatingRecord;
use arena_shared::{JoinRejectCode, MatchMode, SessionId};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct LobbyRoom {
    handle: RoomHandle,
    /// Party rooms are only reachable through their party key.
    party_key: Option<String>,
}

pub struct Lobby {
    config: RoomConfig,
    services: RoomServices,
    verifier: Arc<dyn SessionVerifier>,
    rooms: DashMap<RoomId, LobbyRoom>,
    next_room_id: AtomicU64,
}

impl Lobby {
    pub fn new(config: RoomConfig, services: RoomServices, verifier: Arc<dyn SessionVerifier>) -> Self {
        Self {
            config,
            services,
            verifier,
            rooms: DashMap::new(),
            next_room_id: AtomicU64::new(1),
        }
    }

    pub fn services(&self) -> &RoomServices {
        &self.services
    }

    /// Seats `session` in a room of `mode`
    ///
    /// Every failure is also reported to the session as `join.rejected`.
    pub async fn join(
        &self,
        session: SessionId,
        token: &str,
        mode: MatchMode,
        party_key: Option<&str>,
    ) -> Result<RoomHandle, JoinRejectCode> {
        let identity = match self.verifier.verify_session(token) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Session {} failed verification: {}", session, e);
                reject(self.services.transport.as_ref(), session, JoinRejectCode::AuthFailed);
                return Err(JoinRejectCode::AuthFailed);
            }
        };
        let rating = self.load_rating(&identity.user_id).await;

        let result = match (mode, party_key) {
            (MatchMode::Survival, _) => self.join_new_room(session, identity, rating, mode, None).await,
            (MatchMode::Coop, Some(key)) => self.join_party(session, identity, rating, key).await,
            _ => self.join_open_room(session, identity, rating, mode).await,
        };

        if let Err(code) = result {
            reject(self.services.transport.as_ref(), session, code);
        }
        result
    }

    /// Live room by id, if its task is still running
    pub fn room(&self, id: RoomId) -> Option<RoomHandle> {
        let handle = self.rooms.get(&id).map(|entry| entry.handle.clone())?;
        if handle.is_closed() {
            self.rooms.remove(&id);
            return None;
        }
        Some(handle)
    }

    /// Forgets rooms whose task has finished, returning how many remain
    pub fn prune(&self) -> usize {
        self.rooms.retain(|_, entry| !entry.handle.is_closed());
        self.rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn shutdown_all(&self) {
        for entry in self.rooms.iter() {
            entry.handle.shutdown();
        }
    }

    async fn load_rating(&self, user_id: &str) -> Option<RatingRecord> {
        let store = self.services.store.clone();
        let user_id = user_id.to_string();
        match tokio::task::spawn_blocking(move || store.get_rating_profile(&user_id)).await {
            Ok(Ok(record)) => Some(record),
            Ok(Err(e)) => {
                warn!("Rating profile unavailable: {}", e);
                None
            }
            Err(e) => {
                warn!("Rating lookup task failed: {}", e);
                None
            }
        }
    }

    async fn join_open_room(
        &self,
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
        mode: MatchMode,
    ) -> Result<RoomHandle, JoinRejectCode> {
        let mut candidates: Vec<RoomHandle> = self
            .rooms
            .iter()
            .filter(|entry| entry.handle.mode() == mode && entry.party_key.is_none())
            .map(|entry| entry.handle.clone())
            .collect();
        candidates.sort_by_key(|handle| handle.id());

        for handle in candidates {
            match handle.join(session, identity.clone(), rating.clone()).await {
                Ok(()) => {
                    debug!("Session {} matched into room {}", session, handle.id());
                    return Ok(handle);
                }
                Err(code) => debug!("Room {} passed on session {}: {:?}", handle.id(), session, code),
            }
        }
        self.join_new_room(session, identity, rating, mode, None).await
    }

    async fn join_party(
        &self,
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
        party_key: &str,
    ) -> Result<RoomHandle, JoinRejectCode> {
        let parties = &self.services.parties;
        if parties.is_inviter_waiting(party_key, &identity.user_id) {
            let handle = parties.room_of(party_key).and_then(|id| self.room(id));
            let Some(handle) = handle else {
                return Err(JoinRejectCode::MatchInProgress);
            };
            let user_id = identity.user_id.clone();
            handle.join(session, identity, rating).await?;
            parties.add_member(party_key, &user_id);
            info!("Session {} joined party {} in room {}", session, party_key, handle.id());
            return Ok(handle);
        }

        if parties.get(party_key).is_some() {
            warn!("Party {} is not open to {}", party_key, identity.user_id);
            return Err(JoinRejectCode::MatchInProgress);
        }
        self.join_new_room(session, identity, rating, MatchMode::Coop, Some(party_key))
            .await
    }

    async fn join_new_room(
        &self,
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
        mode: MatchMode,
        party_key: Option<&str>,
    ) -> Result<RoomHandle, JoinRejectCode> {
        let id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
        let user_id = identity.user_id.clone();
        let room = MatchRoom::new(id, mode, self.config.clone());
        let (handle, _task) = spawn_room(
            room,
            &self.config,
            self.services.clone(),
            party_key.map(str::to_string),
        );
        if let Some(key) = party_key {
            self.services.parties.register(key, id, &user_id);
        }
        self.rooms.insert(
            id,
            LobbyRoom {
                handle: handle.clone(),
                party_key: party_key.map(str::to_string),
            },
        );
        info!("Created {} room {} for session {}", mode.as_str(), id, session);

        handle.join(session, identity, rating).await?;
        Ok(handle)
    }
}
