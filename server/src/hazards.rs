//! Transient boss-owned damage zones.

use arena_shared::{point_segment_distance, EntityId, SessionId, Vec2};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HazardShape {
    Line { a: Vec2, b: Vec2, half_width: f32 },
    Point { center: Vec2, radius: f32 },
}

impl HazardShape {
    /// True when a circle of `radius` at `p` overlaps the zone.
    pub fn touches(&self, p: Vec2, radius: f32) -> bool {
        match *self {
            HazardShape::Line { a, b, half_width } => {
                point_segment_distance(p, a, b) <= radius + half_width
            }
            HazardShape::Point { center, radius: r } => p.distance(&center) <= radius + r,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HazardZone {
    pub id: EntityId,
    pub owner: EntityId,
    pub shape: HazardShape,
    pub starts_at: u64,
    pub expires_at: u64,
    pub tick_interval_ms: u64,
    pub next_tick_at: u64,
    pub damage: u32,
    /// Minimum time between two hits on the same victim.
    pub rehit_ms: u64,
    pub last_hits: HashMap<SessionId, u64>,
}

impl HazardZone {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EntityId,
        owner: EntityId,
        shape: HazardShape,
        starts_at: u64,
        lifetime_ms: u64,
        tick_interval_ms: u64,
        damage: u32,
        rehit_ms: u64,
    ) -> Self {
        Self {
            id,
            owner,
            shape,
            starts_at,
            expires_at: starts_at + lifetime_ms,
            tick_interval_ms: tick_interval_ms.max(1),
            next_tick_at: starts_at,
            damage,
            rehit_ms,
            last_hits: HashMap::new(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_due(&self, now: u64) -> bool {
        now >= self.starts_at && now >= self.next_tick_at && now < self.expires_at
    }

    /// Runs one damage tick against `(session, position)` candidates,
    /// returning the sessions hit.
    pub fn tick(&mut self, now: u64, victims: &[(SessionId, Vec2)], victim_radius: f32) -> Vec<SessionId> {
        if !self.is_due(now) {
            return Vec::new();
        }
        self.next_tick_at = now + self.tick_interval_ms;

        let mut hit = Vec::new();
        for &(session, pos) in victims {
            if !self.shape.touches(pos, victim_radius) {
                continue;
            }
            let ready = self
                .last_hits
                .get(&session)
                .map_or(true, |at| now.saturating_sub(*at) >= self.rehit_ms);
            if ready {
                self.last_hits.insert(session, now);
                hit.push(session);
            }
        }
        hit
    }
}
