//! Latest movement/aim intent per session.
//!
//! No history is kept: each `state` message overwrites the previous one and
//! the tick integrates whatever is current. Numeric fields are coerced
//! rather than rejected so bad input can never take the simulation down.

use arena_shared::{finite_or, DamageClaim, SessionId, Vec2};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    /// Movement direction, magnitude at most 1.
    pub move_dir: Vec2,
    /// Raw aim vector; only its direction is used.
    pub aim: Vec2,
}

impl InputIntent {
    pub fn from_raw(move_x: f32, move_y: f32, aim_x: f32, aim_y: f32) -> Self {
        Self {
            move_dir: Vec2::new(move_x, move_y).sanitized().clamp_magnitude(1.0),
            aim: Vec2::new(aim_x, aim_y).sanitized(),
        }
    }
}

/// Coerces every numeric field of a claim into a finite value.
pub fn sanitize_claim(claim: &DamageClaim) -> DamageClaim {
    let mut clean = claim.clone();
    clean.claimed_damage = finite_or(claim.claimed_damage, 0.0).max(0.0);
    clean.aim_x = finite_or(claim.aim_x, 0.0);
    clean.aim_y = finite_or(claim.aim_y, 0.0);
    clean.hit_id = claim
        .hit_id
        .as_ref()
        .map(|h| h.chars().take(64).collect::<String>())
        .filter(|h| !h.is_empty());
    clean
}

#[derive(Debug, Default)]
pub struct InputIntake {
    intents: HashMap<SessionId, InputIntent>,
}

impl InputIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, session: SessionId, intent: InputIntent) {
        self.intents.insert(session, intent);
    }

    pub fn latest(&self, session: SessionId) -> InputIntent {
        self.intents.get(&session).copied().unwrap_or_default()
    }

    pub fn remove(&mut self, session: SessionId) {
        self.intents.remove(&session);
    }
}
