//! Co-op hold-to-revive.
//!
//! A hold is re-validated on every tick; the first tick on which it is not
//! valid drops it and the accumulated progress with it.

use crate::state::EntityStore;
use arena_shared::{ReviveView, SessionId};
use log::info;
use std::collections::HashMap;

pub const REVIVE_RADIUS: f32 = 84.0;
pub const REVIVE_HOLD_MS: u64 = 4000;
pub const REVIVE_HP_FRACTION: f32 = 0.2;

/// Hp a revived player returns with.
pub fn revive_hp(max_hp: u32) -> u32 {
    ((max_hp as f32 * REVIVE_HP_FRACTION).ceil() as u32).clamp(1, max_hp.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviveHold {
    pub target: SessionId,
    pub started_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRevive {
    pub reviver: SessionId,
    pub target: SessionId,
    pub hp: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReviveTick {
    pub completed: Vec<CompletedRevive>,
    /// Sessions whose status differs from the last one pushed.
    pub changed: Vec<(SessionId, ReviveView)>,
}

#[derive(Debug, Default)]
pub struct ReviveTracker {
    requested: HashMap<SessionId, bool>,
    holds: HashMap<SessionId, ReviveHold>,
    last_status: HashMap<SessionId, ReviveView>,
}

impl ReviveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_requested(&mut self, session: SessionId, active: bool) {
        self.requested.insert(session, active);
    }

    pub fn hold_of(&self, reviver: SessionId) -> Option<ReviveHold> {
        self.holds.get(&reviver).copied()
    }

    pub fn forget(&mut self, session: SessionId) {
        self.requested.remove(&session);
        self.holds.remove(&session);
        self.holds.retain(|_, hold| hold.target != session);
        self.last_status.remove(&session);
    }

    pub fn clear(&mut self) {
        self.holds.clear();
        self.requested.clear();
    }

    pub fn tick(&mut self, store: &mut EntityStore, now: u64) -> ReviveTick {
        let mut result = ReviveTick::default();
        let sessions: Vec<SessionId> = store.sessions().to_vec();

        for &reviver in &sessions {
            let wants = self.requested.get(&reviver).copied().unwrap_or(false);
            let candidate = if wants { downed_ally_in_reach(store, reviver) } else { None };
            let taken = self
                .holds
                .iter()
                .any(|(other, hold)| *other != reviver && Some(hold.target) == candidate);

            match (candidate, self.holds.get(&reviver).copied()) {
                (Some(target), Some(hold)) if hold.target == target && !taken => {}
                (Some(target), _) if !taken => {
                    self.holds.insert(
                        reviver,
                        ReviveHold {
                            target,
                            started_at: now,
                        },
                    );
                }
                _ => {
                    self.holds.remove(&reviver);
                }
            }

            let Some(hold) = self.holds.get(&reviver).copied() else {
                continue;
            };
            if now.saturating_sub(hold.started_at) < REVIVE_HOLD_MS {
                continue;
            }
            self.holds.remove(&reviver);
            if let Some(target) = store.player_mut(hold.target) {
                target.hp = revive_hp(target.max_hp);
                info!("Player {} revived {} at {} hp", reviver, hold.target, target.hp);
                result.completed.push(CompletedRevive {
                    reviver,
                    target: hold.target,
                    hp: target.hp,
                });
            }
        }

        for &session in &sessions {
            let view = self.view_of(store, session);
            if self.last_status.get(&session) != Some(&view) {
                self.last_status.insert(session, view.clone());
                result.changed.push((session, view));
            }
        }
        result
    }

    fn view_of(&self, store: &EntityStore, session: SessionId) -> ReviveView {
        let own = self.holds.get(&session);
        let incoming = self
            .holds
            .iter()
            .find(|(_, hold)| hold.target == session)
            .map(|(reviver, hold)| (*reviver, *hold));
        ReviveView {
            can_hold: downed_ally_in_reach(store, session).is_some(),
            hold_active: own.is_some(),
            being_revived: incoming.is_some(),
            target: own.map(|h| h.target),
            reviver: incoming.map(|(reviver, _)| reviver),
            started_at: own.or(incoming.as_ref().map(|(_, h)| h)).map(|h| h.started_at),
            duration_ms: REVIVE_HOLD_MS,
        }
    }
}

/// Nearest downed ally within [`REVIVE_RADIUS`] of a living `reviver`.
fn downed_ally_in_reach(store: &EntityStore, reviver: SessionId) -> Option<SessionId> {
    let me = store.player(reviver).filter(|p| p.is_alive())?;
    store
        .players()
        .filter(|p| p.session != reviver && !p.is_alive())
        .map(|p| (p.session, p.pos.distance(&me.pos)))
        .filter(|(_, d)| *d <= REVIVE_RADIUS)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(session, _)| session)
}
