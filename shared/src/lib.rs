//! Types shared between the arena server and its clients: arena geometry,
//! gameplay constants and the wire protocol.

pub mod math;
pub mod protocol;

pub use math::{finite_or, point_segment_distance, Vec2};
pub use protocol::*;

pub const ARENA_WIDTH: f32 = 2400.0;
pub const ARENA_HEIGHT: f32 = 1600.0;
/// Distance every entity keeps from the arena walls.
pub const ARENA_MARGIN: f32 = 24.0;
pub const PLAYER_RADIUS: f32 = 18.0;
pub const PLAYER_SPEED: f32 = 260.0;

/// Playable rectangle of one room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
        }
    }
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Clamps a point into `[24, W-24] × [24, H-24]`. Non-finite input lands
    /// on the arena center.
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        if !p.is_finite() {
            return self.center();
        }
        Vec2::new(
            p.x.clamp(ARENA_MARGIN, self.width - ARENA_MARGIN),
            p.y.clamp(ARENA_MARGIN, self.height - ARENA_MARGIN),
        )
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= ARENA_MARGIN
            && p.x <= self.width - ARENA_MARGIN
            && p.y >= ARENA_MARGIN
            && p.y <= self.height - ARENA_MARGIN
    }
}
