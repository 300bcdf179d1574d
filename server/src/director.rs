//! Enemy spawn pacing and co-op stage progression.

use crate::boss::BossAi;
use crate::config::{ModeRules, Pacing};
use crate::state::EntityStore;
use arena_shared::{Arena, EnemyKind, EntityId, Vec2};
use log::{debug, info};
use rand::Rng;
use std::f32::consts::PI;

pub const BOSS_STAGE_EVERY: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPlan {
    pub interval_ms: u64,
    pub cap: usize,
}

/// Duel/survival pacing by seconds since the match went live.
pub fn timed_plan(elapsed_secs: u64) -> SpawnPlan {
    SpawnPlan {
        interval_ms: 2400u64.saturating_sub(12 * elapsed_secs).max(650),
        cap: (6 + elapsed_secs / 12).min(28) as usize,
    }
}

/// Co-op pacing by stage number.
pub fn staged_plan(stage: u32) -> SpawnPlan {
    SpawnPlan {
        interval_ms: 1500u64.saturating_sub(55 * stage as u64).max(380),
        cap: (10 + 2 * stage).min(40) as usize,
    }
}

pub fn is_boss_stage(stage: u32) -> bool {
    stage > 0 && stage % BOSS_STAGE_EVERY == 0
}

pub fn kill_goal(stage: u32) -> u32 {
    if is_boss_stage(stage) {
        1
    } else {
        24 + 7 * stage.saturating_sub(1)
    }
}

pub fn staged_hp_scale(stage: u32) -> f32 {
    1.0 + 0.12 * stage.saturating_sub(1) as f32
}

pub fn timed_hp_scale(elapsed_ms: u64) -> f32 {
    1.0 + 0.1 * (elapsed_ms as f32 / 60_000.0)
}

fn weighted_pick(weights: &[(EnemyKind, u32)], rng: &mut impl Rng) -> EnemyKind {
    let total: u32 = weights.iter().map(|(_, w)| *w).sum();
    if total == 0 {
        return EnemyKind::Scout;
    }
    let mut roll = rng.gen_range(0..total);
    for (kind, weight) in weights {
        if roll < *weight {
            return *kind;
        }
        roll -= weight;
    }
    EnemyKind::Scout
}

/// Time-based mix: tanks from 45s, elites from 120s, minibosses from 240s.
pub fn timed_kind(elapsed_secs: u64, rng: &mut impl Rng) -> EnemyKind {
    let mut weights = vec![(EnemyKind::Scout, 60)];
    if elapsed_secs >= 45 {
        weights.push((EnemyKind::Tank, 25));
    }
    if elapsed_secs >= 120 {
        weights.push((EnemyKind::Elite, 12));
    }
    if elapsed_secs >= 240 {
        weights.push((EnemyKind::Miniboss, 5));
    }
    weighted_pick(&weights, rng)
}

pub fn staged_kind(stage: u32, rng: &mut impl Rng) -> EnemyKind {
    let mut weights = vec![(EnemyKind::Scout, 60)];
    if stage >= 2 {
        weights.push((EnemyKind::Tank, 25));
    }
    if stage >= 4 {
        weights.push((EnemyKind::Elite, 12 + stage));
    }
    if stage >= 8 {
        weights.push((EnemyKind::Miniboss, 4 + stage / 2));
    }
    weighted_pick(&weights, rng)
}

/// Random point on a ring around `center`, clamped into the arena.
pub fn spawn_point(center: Vec2, radius_min: f32, radius_max: f32, arena: &Arena, rng: &mut impl Rng) -> Vec2 {
    let angle = rng.gen_range(0.0..(2.0 * PI));
    let radius = if radius_max > radius_min {
        rng.gen_range(radius_min..radius_max)
    } else {
        radius_min
    };
    arena.clamp(center + Vec2::from_angle(angle).scale(radius))
}

/// Decides when and what to spawn.
#[derive(Debug, Clone)]
pub struct EnemyDirector {
    rules: ModeRules,
    next_spawn_at: Option<u64>,
}

impl EnemyDirector {
    pub fn new(rules: ModeRules) -> Self {
        Self {
            rules,
            next_spawn_at: None,
        }
    }

    /// Restarts the spawn clock, e.g. after a stage transition.
    pub fn reset(&mut self) {
        self.next_spawn_at = None;
    }

    /// Spawns at most one enemy (or the stage boss) and returns new ids.
    pub fn step(
        &mut self,
        store: &mut EntityStore,
        now: u64,
        elapsed_ms: u64,
        stage: u32,
        rng: &mut impl Rng,
    ) -> Vec<EntityId> {
        if store.living_players().next().is_none() {
            return Vec::new();
        }

        if self.rules.pacing == Pacing::Staged && is_boss_stage(stage) {
            if store.boss_alive() {
                return Vec::new();
            }
            let pos = self.spawn_point(store, rng);
            let id = store.spawn_enemy(EnemyKind::Boss, pos, staged_hp_scale(stage));
            if let Some(boss) = store.enemy_mut(id) {
                boss.boss = Some(BossAi::new(now, stage));
            }
            info!("Spawned stage {} boss {}", stage, id);
            return vec![id];
        }

        let next = *self.next_spawn_at.get_or_insert(now);
        if now < next {
            return Vec::new();
        }

        let elapsed_secs = elapsed_ms / 1000;
        let (plan, kind, hp_scale) = match self.rules.pacing {
            Pacing::Timed => (
                timed_plan(elapsed_secs),
                timed_kind(elapsed_secs, rng),
                timed_hp_scale(elapsed_ms),
            ),
            Pacing::Staged => (
                staged_plan(stage),
                staged_kind(stage, rng),
                staged_hp_scale(stage),
            ),
        };
        self.next_spawn_at = Some(now + plan.interval_ms);

        if store.living_enemy_count() >= plan.cap {
            return Vec::new();
        }
        let pos = self.spawn_point(store, rng);
        let id = store.spawn_enemy(kind, pos, hp_scale);
        debug!("Spawned {:?} {} at ({:.0}, {:.0})", kind, id, pos.x, pos.y);
        vec![id]
    }

    /// Hp multiplier for enemies spawned outside the regular cadence.
    pub fn hp_scale(&self, elapsed_ms: u64, stage: u32) -> f32 {
        match self.rules.pacing {
            Pacing::Timed => timed_hp_scale(elapsed_ms),
            Pacing::Staged => staged_hp_scale(stage),
        }
    }

    fn spawn_point(&self, store: &EntityStore, rng: &mut impl Rng) -> Vec2 {
        spawn_point(
            store.living_centroid(),
            self.rules.spawn_radius_min,
            self.rules.spawn_radius_max,
            &store.arena,
            rng,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Kill counted, stage continues.
    Counted,
    /// Kill ignored (non-boss kill on a boss stage).
    Ignored,
    Advanced(u32),
    /// The final stage was cleared.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTracker {
    pub stage: u32,
    pub kills: u32,
    pub goal: u32,
    pub final_stage: u32,
}

impl StageTracker {
    pub fn new(final_stage: u32) -> Self {
        Self {
            stage: 1,
            kills: 0,
            goal: kill_goal(1),
            final_stage: final_stage.max(1),
        }
    }

    pub fn is_boss_stage(&self) -> bool {
        is_boss_stage(self.stage)
    }

    /// Jumps to `stage` with a fresh counter.
    pub fn set_stage(&mut self, stage: u32) {
        self.stage = stage.max(1);
        self.kills = 0;
        self.goal = kill_goal(self.stage);
    }

    pub fn record_kill(&mut self, kind: EnemyKind) -> StageOutcome {
        if self.is_boss_stage() && kind != EnemyKind::Boss {
            return StageOutcome::Ignored;
        }
        self.kills += 1;
        if self.kills < self.goal {
            return StageOutcome::Counted;
        }
        if self.stage >= self.final_stage {
            return StageOutcome::Cleared;
        }
        self.set_stage(self.stage + 1);
        StageOutcome::Advanced(self.stage)
    }
}
