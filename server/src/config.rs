//! Room configuration and per-mode rules.
//!
//! Mode-specific behaviour (pacing, progression style, rating, revive) is
//! plain data in [`ModeRules`] so one room type serves every mode.

use arena_shared::{Arena, MatchMode, ARENA_HEIGHT, ARENA_WIDTH};

/// Tunables shared by every room created by one server process.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub tick_rate: u32,
    pub arena_width: f32,
    pub arena_height: f32,
    /// Cadence of `state.sync` / `pve.sync` broadcasts.
    pub sync_interval_ms: u64,
    pub countdown_ms: u64,
    /// Delay between `match.end` and room disposal.
    pub dispose_delay_ms: u64,
    pub final_stage: u32,
    /// Fixed RNG seed, or `None` for an entropy-seeded room.
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            arena_width: ARENA_WIDTH,
            arena_height: ARENA_HEIGHT,
            sync_interval_ms: 100,
            countdown_ms: 3000,
            dispose_delay_ms: 5000,
            final_stage: 20,
            seed: None,
        }
    }
}

impl RoomConfig {
    pub fn arena(&self) -> Arena {
        Arena::new(self.arena_width, self.arena_height)
    }

    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / self.tick_rate.max(1)).max(1) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Spawn pressure grows with elapsed match time.
    Timed,
    /// Spawn pressure follows the co-op stage number.
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelUpStyle {
    /// One outstanding three-card offer with an auto-pick deadline.
    Offer,
    /// Banked tokens spent by explicit picks.
    Tokens,
}

#[derive(Debug, Clone)]
pub struct ModeRules {
    pub mode: MatchMode,
    pub required_players: usize,
    pub max_players: usize,
    pub pacing: Pacing,
    pub level_up: LevelUpStyle,
    pub pvp_enabled: bool,
    pub revive_enabled: bool,
    pub rated: bool,
    pub spawn_radius_min: f32,
    pub spawn_radius_max: f32,
    pub base_max_hp: u32,
    pub max_hp_per_level: u32,
}

impl ModeRules {
    pub fn for_mode(mode: MatchMode) -> Self {
        match mode {
            MatchMode::Duel => Self {
                mode,
                required_players: 2,
                max_players: 2,
                pacing: Pacing::Timed,
                level_up: LevelUpStyle::Offer,
                pvp_enabled: true,
                revive_enabled: false,
                rated: true,
                spawn_radius_min: 460.0,
                spawn_radius_max: 760.0,
                base_max_hp: 100,
                max_hp_per_level: 6,
            },
            MatchMode::Survival => Self {
                mode,
                required_players: 1,
                max_players: 1,
                pacing: Pacing::Timed,
                level_up: LevelUpStyle::Tokens,
                pvp_enabled: false,
                revive_enabled: false,
                rated: false,
                spawn_radius_min: 460.0,
                spawn_radius_max: 760.0,
                base_max_hp: 120,
                max_hp_per_level: 8,
            },
            MatchMode::Coop => Self {
                mode,
                required_players: 2,
                max_players: 2,
                pacing: Pacing::Staged,
                level_up: LevelUpStyle::Tokens,
                pvp_enabled: false,
                revive_enabled: true,
                rated: false,
                spawn_radius_min: 420.0,
                spawn_radius_max: 820.0,
                base_max_hp: 120,
                max_hp_per_level: 8,
            },
        }
    }
}
