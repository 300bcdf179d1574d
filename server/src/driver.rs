//! Per-room tokio task.
//!
//! Each [`MatchRoom`] is owned by exactly one task that alternates between
//! draining its command channel and ticking on a fixed interval. Nothing
//! else touches the room, so the room itself needs no locks.

use crate::auth::VerifiedSession;
use crate::config::RoomConfig;
use crate::outbox::Transport;
use crate::party::PartyRegistry;
use crate::room::{MatchResult, MatchRoom, RoomId};
use crate::store::{ProfileStore, RatingRecord};
use arena_shared::{ClientMessage, JoinRejectCode, MatchMode, ServerMessage, SessionId};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Commands accepted by a running room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
        reply: oneshot::Sender<Result<(), JoinRejectCode>>,
    },
    Leave {
        session: SessionId,
    },
    Message {
        session: SessionId,
        message: ClientMessage,
    },
    Shutdown,
}

/// Shared collaborators every room task needs
#[derive(Clone)]
pub struct RoomServices {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn ProfileStore>,
    pub parties: Arc<PartyRegistry>,
}

/// Cloneable handle to a room task
///
/// Sending on a handle whose task has finished is a no-op; callers find out
/// through [`RoomHandle::is_closed`] and drop the handle.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    mode: MatchMode,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Asks the room to seat `session` and waits for its answer
    ///
    /// A room that has already shut down answers `MatchInProgress` so the
    /// lobby moves on to another room.
    pub async fn join(
        &self,
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
    ) -> Result<(), JoinRejectCode> {
        let (reply, answer) = oneshot::channel();
        let command = RoomCommand::Join {
            session,
            identity,
            rating,
            reply,
        };
        if self.tx.send(command).is_err() {
            return Err(JoinRejectCode::MatchInProgress);
        }
        answer.await.unwrap_or(Err(JoinRejectCode::MatchInProgress))
    }

    pub fn leave(&self, session: SessionId) {
        let _ = self.tx.send(RoomCommand::Leave { session });
    }

    pub fn send_message(&self, session: SessionId, message: ClientMessage) {
        let _ = self.tx.send(RoomCommand::Message { session, message });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(RoomCommand::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Millisecond clock local to one room
struct RoomClock {
    epoch: Instant,
}

impl RoomClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Spawns the task that owns `room`
///
/// `party_key` is the co-op party this room hosts, if any; its registry
/// entry follows the room's phase and is removed when the room goes away.
pub fn spawn_room(
    room: MatchRoom,
    config: &RoomConfig,
    services: RoomServices,
    party_key: Option<String>,
) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        id: room.id(),
        mode: room.mode(),
        tx,
    };
    let tick = Duration::from_millis(config.tick_interval_ms());
    let task = tokio::spawn(run_room(room, tick, services, party_key, rx));
    (handle, task)
}

async fn run_room(
    mut room: MatchRoom,
    tick: Duration,
    services: RoomServices,
    party_key: Option<String>,
    mut rx: mpsc::UnboundedReceiver<RoomCommand>,
) {
    let clock = RoomClock::new();
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_phase = room.phase();
    info!("Room {} ({}) task started", room.id(), room.mode().as_str());

    loop {
        tokio::select! {
            command = rx.recv() => {
                let now = clock.now();
                match command {
                    Some(RoomCommand::Join { session, identity, rating, reply }) => {
                        let result = room.join(session, identity, rating, now);
                        if let Err(code) = result {
                            debug!("Room {} rejected session {}: {:?}", room.id(), session, code);
                        }
                        let _ = reply.send(result);
                    }
                    Some(RoomCommand::Leave { session }) => room.leave(session, now),
                    Some(RoomCommand::Message { session, message }) => {
                        room.handle_message(session, message, now)
                    }
                    Some(RoomCommand::Shutdown) | None => room.dispose(),
                }
            }
            _ = interval.tick() => {
                room.tick(clock.now());
            }
        }

        room.flush_outbox(services.transport.as_ref());

        if let Some(result) = room.take_match_result() {
            commit_result(&services, result);
        }

        if room.phase() != last_phase {
            last_phase = room.phase();
            if let Some(key) = &party_key {
                services.parties.set_phase(key, last_phase);
            }
        }

        if room.is_disposed() {
            break;
        }
    }

    let removed = services.parties.remove_room(room.id());
    info!(
        "Room {} task finished after {} ticks ({} parties removed)",
        room.id(),
        room.tick_count(),
        removed
    );
}

/// Commits a rated result off the tick path and pushes fresh profiles
///
/// The `match.end` broadcast has already gone out; a failed commit is
/// logged and does not change the outcome players saw.
fn commit_result(services: &RoomServices, result: MatchResult) {
    let store = services.store.clone();
    let transport = services.transport.clone();
    tokio::task::spawn_blocking(move || {
        let committed = match store.commit_match_result(
            &result.winner_user,
            &result.loser_user,
            result.reason,
        ) {
            Ok(committed) => committed,
            Err(e) => {
                error!(
                    "Room {}: failed to commit {} over {}: {}",
                    result.room, result.winner_user, result.loser_user, e
                );
                return;
            }
        };
        info!(
            "Room {}: rating {} -> {}, {} -> {}",
            result.room,
            result.winner_user,
            committed.winner.rating,
            result.loser_user,
            committed.loser.rating
        );

        let sessions = [result.winner_session, result.loser_session];
        let profiles = [
            (result.winner_session, result.winner_name.clone(), &committed.winner),
            (result.loser_session, result.loser_name.clone(), &committed.loser),
        ];
        for (session, name, record) in profiles {
            let message = ServerMessage::Profile {
                session,
                user_id: record.user_id.clone(),
                name,
                rating: record.rating,
                wins: record.wins,
                losses: record.losses,
                matches: record.matches,
            };
            transport.broadcast(&sessions, message, None);
        }
    });
}

/// Rejects a join without a room, straight through the transport
pub fn reject(transport: &dyn Transport, session: SessionId, code: JoinRejectCode) {
    warn!("Join rejected for session {}: {:?}", session, code);
    transport.send_to(session, ServerMessage::JoinRejected { code });
}
