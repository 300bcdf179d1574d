//! Boss finite-state machine.
//!
//! A boss idles (chasing the nearest living player) until its attack
//! cooldown runs out, then rolls one of four telegraphed attacks. Every
//! attack starts with a warn phase that is broadcast before any damage.
//! Damage is dealt either directly (dash contact) or through hazard zones
//! registered in the [`EntityStore`].

use crate::hazards::{HazardShape, HazardZone};
use crate::state::EntityStore;
use arena_shared::{
    BossPhase, EnemyKind, EntityId, LineSegment, ServerMessage, SessionId, Vec2, PLAYER_RADIUS,
};
use log::debug;
use rand::Rng;
use std::collections::HashMap;
use std::f32::consts::PI;

const DASH_WARN_MS: u64 = 520;
const DASH_COMBO_WARN_MS: u64 = 280;
const DASH_MAX_MS: u64 = 300;
const DASH_REHIT_MS: u64 = 180;

const LASER_WARN_MS: u64 = 720;
const LASER_ACTIVE_MS: u64 = 700;
const LASER_LINES: usize = 5;
const LASER_SPACING_DEG: f32 = 22.0;
const LASER_LENGTH: f32 = 900.0;
const LASER_HALF_WIDTH: f32 = 14.0;
const LASER_TICK_MS: u64 = 120;
const LASER_REHIT_MS: u64 = 260;

const NOVA_WARN_MS: u64 = 700;
const NOVA_ACTIVE_MS: u64 = 560;
const NOVA_RADIUS: f32 = 210.0;
const NOVA_PULSE_MS: u64 = 50;
const NOVA_LINES: usize = 10;
const NOVA_LENGTH: f32 = 620.0;
const NOVA_HALF_WIDTH: f32 = 12.0;

const SUMMON_WARN_MS: u64 = 520;
const SUMMON_RADIUS_MIN: f32 = 120.0;
const SUMMON_RADIUS_MAX: f32 = 180.0;

/// Idle time between two attacks at `stage`.
pub fn attack_cooldown_ms(stage: u32) -> u64 {
    3200u64.saturating_sub(60 * stage as u64).max(1400)
}

pub fn dash_speed(stage: u32) -> f32 {
    900.0 + 6.5 * stage as f32
}

/// Dashes per dash attack.
pub fn dash_count(stage: u32) -> u32 {
    if stage >= 10 {
        3
    } else {
        2
    }
}

pub fn dash_damage(stage: u32) -> u32 {
    (30.0 + 0.6 * stage as f32).round() as u32
}

pub fn laser_damage(stage: u32) -> u32 {
    (28.0 + 0.9 * stage as f32).round() as u32
}

pub fn nova_pulse_damage(stage: u32) -> u32 {
    (24.0 + 0.8 * stage as f32).round() as u32
}

pub fn nova_line_damage(stage: u32) -> u32 {
    (20.0 + 0.75 * stage as f32).round() as u32
}

pub fn summon_count(stage: u32) -> u32 {
    (2 + stage / 10).min(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossState {
    Idle,
    DashWarn,
    Dash,
    LaserWarn,
    Laser,
    NovaWarn,
    Nova,
    SummonWarn,
}

#[derive(Debug, Clone)]
pub struct BossAi {
    pub state: BossState,
    pub state_until: u64,
    pub next_attack_at: u64,
    pub dir: Vec2,
    /// Dashes still to run after the current one.
    pub combo_left: u32,
    dash_hits: HashMap<SessionId, u64>,
}

/// Something the room must act on after a boss step.
#[derive(Debug, Clone, PartialEq)]
pub enum BossEvent {
    Broadcast(ServerMessage),
    Hit { victim: SessionId, damage: u32 },
    Spawned(EntityId),
}

impl BossAi {
    pub fn new(now: u64, stage: u32) -> Self {
        Self {
            state: BossState::Idle,
            state_until: now,
            next_attack_at: now + attack_cooldown_ms(stage),
            dir: Vec2::new(1.0, 0.0),
            combo_left: 0,
            dash_hits: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Option<BossPhase> {
        match self.state {
            BossState::Idle => None,
            BossState::DashWarn => Some(BossPhase::DashWarn),
            BossState::Dash => Some(BossPhase::Dash),
            BossState::LaserWarn => Some(BossPhase::LaserWarn),
            BossState::Laser => Some(BossPhase::Laser),
            BossState::NovaWarn => Some(BossPhase::NovaWarn),
            BossState::Nova => Some(BossPhase::Nova),
            BossState::SummonWarn => Some(BossPhase::SummonWarn),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == BossState::Idle
    }

    fn enter(&mut self, state: BossState, now: u64, duration_ms: u64) {
        self.state = state;
        self.state_until = now + duration_ms;
    }

    fn finish_attack(&mut self, now: u64, stage: u32) {
        self.state = BossState::Idle;
        self.state_until = now;
        self.combo_left = 0;
        self.next_attack_at = now + attack_cooldown_ms(stage);
    }
}

/// Context a boss step needs besides the store.
#[derive(Debug, Clone, Copy)]
pub struct BossStepContext {
    pub now: u64,
    pub dt_secs: f32,
    pub stage: u32,
    /// Hp multiplier for summoned adds.
    pub add_hp_scale: f32,
}

/// Advances one boss by one tick.
pub fn step_boss(
    store: &mut EntityStore,
    boss_id: EntityId,
    ctx: BossStepContext,
    rng: &mut impl Rng,
) -> Vec<BossEvent> {
    // The AI is taken out so the store can be mutated while it runs.
    let Some(mut ai) = store.enemy_mut(boss_id).and_then(|e| e.boss.take()) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    run_state(&mut ai, store, boss_id, ctx, rng, &mut events);
    if let Some(enemy) = store.enemy_mut(boss_id) {
        enemy.boss = Some(ai);
    }
    events
}

fn run_state(
    ai: &mut BossAi,
    store: &mut EntityStore,
    boss_id: EntityId,
    ctx: BossStepContext,
    rng: &mut impl Rng,
    events: &mut Vec<BossEvent>,
) {
    let now = ctx.now;
    let Some(boss) = store.enemy(boss_id) else {
        return;
    };
    let (boss_pos, boss_radius, boss_speed) = (boss.pos, boss.radius, boss.speed);
    let target = store.nearest_living_player(boss_pos);

    match ai.state {
        BossState::Idle => {
            if let Some((_, target_pos)) = target {
                let step = (target_pos - boss_pos).clamp_magnitude(boss_speed * ctx.dt_secs);
                let arena = store.arena;
                if let Some(enemy) = store.enemy_mut(boss_id) {
                    enemy.pos = arena.clamp(enemy.pos + step);
                }
            }
            if now < ai.next_attack_at {
                return;
            }
            ai.dir = aim_at(boss_pos, target.map(|t| t.1), ai.dir);
            let roll: f32 = rng.gen();
            if roll < 0.30 {
                ai.combo_left = dash_count(ctx.stage).saturating_sub(1);
                ai.enter(BossState::DashWarn, now, DASH_WARN_MS);
                events.push(dash_warn(boss_id, boss_pos, boss_radius, ai.dir, ctx.stage, DASH_WARN_MS));
            } else if roll < 0.58 {
                ai.enter(BossState::LaserWarn, now, LASER_WARN_MS);
                let segments = fan(boss_pos, ai.dir, LASER_LINES, LASER_SPACING_DEG, LASER_LENGTH, LASER_HALF_WIDTH);
                events.push(attack_message(
                    boss_id,
                    BossPhase::LaserWarn,
                    boss_pos,
                    ai.dir,
                    LASER_WARN_MS,
                    0.0,
                    segments,
                ));
            } else if roll < 0.82 {
                ai.enter(BossState::NovaWarn, now, NOVA_WARN_MS);
                let segments = radial(boss_pos, ai.dir, NOVA_LINES, NOVA_LENGTH, NOVA_HALF_WIDTH);
                events.push(attack_message(
                    boss_id,
                    BossPhase::NovaWarn,
                    boss_pos,
                    ai.dir,
                    NOVA_WARN_MS,
                    NOVA_RADIUS,
                    segments,
                ));
            } else {
                ai.enter(BossState::SummonWarn, now, SUMMON_WARN_MS);
                events.push(attack_message(
                    boss_id,
                    BossPhase::SummonWarn,
                    boss_pos,
                    ai.dir,
                    SUMMON_WARN_MS,
                    SUMMON_RADIUS_MAX,
                    Vec::new(),
                ));
            }
            debug!("Boss {} begins {:?}", boss_id, ai.state);
        }
        BossState::DashWarn => {
            if now < ai.state_until {
                return;
            }
            ai.dash_hits.clear();
            ai.enter(BossState::Dash, now, DASH_MAX_MS);
            events.push(attack_message(
                boss_id,
                BossPhase::Dash,
                boss_pos,
                ai.dir,
                DASH_MAX_MS,
                boss_radius,
                Vec::new(),
            ));
        }
        BossState::Dash => {
            let arena = store.arena;
            let wanted = boss_pos + ai.dir.scale(dash_speed(ctx.stage) * ctx.dt_secs);
            let landed = arena.clamp(wanted);
            let hit_wall = landed != wanted;
            if let Some(enemy) = store.enemy_mut(boss_id) {
                enemy.pos = landed;
            }

            let reach = boss_radius + PLAYER_RADIUS;
            for (session, pos) in store.living_positions() {
                if pos.distance(&landed) > reach {
                    continue;
                }
                let ready = ai
                    .dash_hits
                    .get(&session)
                    .map_or(true, |at| now.saturating_sub(*at) >= DASH_REHIT_MS);
                if ready {
                    ai.dash_hits.insert(session, now);
                    events.push(BossEvent::Hit {
                        victim: session,
                        damage: dash_damage(ctx.stage),
                    });
                }
            }

            if now < ai.state_until && !hit_wall {
                return;
            }
            if ai.combo_left > 0 {
                ai.combo_left -= 1;
                ai.dir = aim_at(landed, target.map(|t| t.1), ai.dir);
                ai.enter(BossState::DashWarn, now, DASH_COMBO_WARN_MS);
                events.push(dash_warn(boss_id, landed, boss_radius, ai.dir, ctx.stage, DASH_COMBO_WARN_MS));
            } else {
                ai.finish_attack(now, ctx.stage);
            }
        }
        BossState::LaserWarn => {
            if now < ai.state_until {
                return;
            }
            let segments = fan(boss_pos, ai.dir, LASER_LINES, LASER_SPACING_DEG, LASER_LENGTH, LASER_HALF_WIDTH);
            for segment in &segments {
                let id = store.alloc_hazard_id();
                store.add_hazard(HazardZone::new(
                    id,
                    boss_id,
                    line_shape(segment),
                    now,
                    LASER_ACTIVE_MS,
                    LASER_TICK_MS,
                    laser_damage(ctx.stage),
                    LASER_REHIT_MS,
                ));
            }
            ai.enter(BossState::Laser, now, LASER_ACTIVE_MS);
            events.push(attack_message(
                boss_id,
                BossPhase::Laser,
                boss_pos,
                ai.dir,
                LASER_ACTIVE_MS,
                0.0,
                segments,
            ));
        }
        BossState::NovaWarn => {
            if now < ai.state_until {
                return;
            }
            let pulse = store.alloc_hazard_id();
            store.add_hazard(HazardZone::new(
                pulse,
                boss_id,
                HazardShape::Point {
                    center: boss_pos,
                    radius: NOVA_RADIUS,
                },
                now,
                NOVA_PULSE_MS,
                1000,
                nova_pulse_damage(ctx.stage),
                1000,
            ));
            let segments = radial(boss_pos, ai.dir, NOVA_LINES, NOVA_LENGTH, NOVA_HALF_WIDTH);
            for segment in &segments {
                let id = store.alloc_hazard_id();
                store.add_hazard(HazardZone::new(
                    id,
                    boss_id,
                    line_shape(segment),
                    now,
                    NOVA_ACTIVE_MS,
                    LASER_TICK_MS,
                    nova_line_damage(ctx.stage),
                    LASER_REHIT_MS,
                ));
            }
            ai.enter(BossState::Nova, now, NOVA_ACTIVE_MS);
            events.push(attack_message(
                boss_id,
                BossPhase::Nova,
                boss_pos,
                ai.dir,
                NOVA_ACTIVE_MS,
                NOVA_RADIUS,
                segments,
            ));
        }
        BossState::Laser | BossState::Nova => {
            if now >= ai.state_until {
                ai.finish_attack(now, ctx.stage);
            }
        }
        BossState::SummonWarn => {
            if now < ai.state_until {
                return;
            }
            for _ in 0..summon_count(ctx.stage) {
                let kind = match rng.gen_range(0..100) {
                    0..=49 => EnemyKind::Tank,
                    50..=84 => EnemyKind::Elite,
                    _ => EnemyKind::Miniboss,
                };
                let angle = rng.gen_range(0.0..(2.0 * PI));
                let radius = rng.gen_range(SUMMON_RADIUS_MIN..SUMMON_RADIUS_MAX);
                let pos = boss_pos + Vec2::from_angle(angle).scale(radius);
                let id = store.spawn_enemy(kind, pos, ctx.add_hp_scale);
                events.push(BossEvent::Spawned(id));
            }
            events.push(attack_message(
                boss_id,
                BossPhase::Summon,
                boss_pos,
                ai.dir,
                0,
                SUMMON_RADIUS_MAX,
                Vec::new(),
            ));
            ai.finish_attack(now, ctx.stage);
        }
    }
}

fn aim_at(from: Vec2, target: Option<Vec2>, fallback: Vec2) -> Vec2 {
    let dir = target.map(|t| (t - from).normalize()).unwrap_or(Vec2::ZERO);
    if dir == Vec2::ZERO {
        fallback
    } else {
        dir
    }
}

fn dash_warn(boss: EntityId, pos: Vec2, radius: f32, dir: Vec2, stage: u32, duration_ms: u64) -> BossEvent {
    let reach = dash_speed(stage) * DASH_MAX_MS as f32 / 1000.0;
    let end = pos + dir.scale(reach);
    let lane = LineSegment {
        ax: pos.x,
        ay: pos.y,
        bx: end.x,
        by: end.y,
        half_width: radius,
    };
    attack_message(boss, BossPhase::DashWarn, pos, dir, duration_ms, radius, vec![lane])
}

fn attack_message(
    boss: EntityId,
    phase: BossPhase,
    pos: Vec2,
    dir: Vec2,
    duration_ms: u64,
    radius: f32,
    segments: Vec<LineSegment>,
) -> BossEvent {
    BossEvent::Broadcast(ServerMessage::BossAttack {
        boss,
        phase,
        x: pos.x,
        y: pos.y,
        dir_x: dir.x,
        dir_y: dir.y,
        duration_ms,
        radius,
        segments,
    })
}

fn line_shape(segment: &LineSegment) -> HazardShape {
    HazardShape::Line {
        a: Vec2::new(segment.ax, segment.ay),
        b: Vec2::new(segment.bx, segment.by),
        half_width: segment.half_width,
    }
}

fn segment_at(origin: Vec2, angle: f32, length: f32, half_width: f32) -> LineSegment {
    let end = origin + Vec2::from_angle(angle).scale(length);
    LineSegment {
        ax: origin.x,
        ay: origin.y,
        bx: end.x,
        by: end.y,
        half_width,
    }
}

/// `count` lines centred on `dir`, `spacing_deg` apart.
fn fan(origin: Vec2, dir: Vec2, count: usize, spacing_deg: f32, length: f32, half_width: f32) -> Vec<LineSegment> {
    let base = dir.angle();
    let spacing = spacing_deg.to_radians();
    let mid = (count as f32 - 1.0) / 2.0;
    (0..count)
        .map(|i| segment_at(origin, base + (i as f32 - mid) * spacing, length, half_width))
        .collect()
}

/// `count` lines evenly spread around the full circle.
fn radial(origin: Vec2, dir: Vec2, count: usize, length: f32, half_width: f32) -> Vec<LineSegment> {
    let base = dir.angle();
    let step = 2.0 * PI / count as f32;
    (0..count)
        .map(|i| segment_at(origin, base + i as f32 * step, length, half_width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PlayerEntity;
    use arena_shared::{point_segment_distance, Arena};
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn arena_with_boss(stage: u32) -> (EntityStore, EntityId) {
        let mut store = EntityStore::new(Arena::default());
        store.add_player(PlayerEntity::new(1, "a".into(), "A".into(), Vec2::new(1400.0, 800.0), 120));
        let boss = store.spawn_enemy(EnemyKind::Boss, Vec2::new(1000.0, 800.0), 1.0);
        store.enemy_mut(boss).unwrap().boss = Some(BossAi::new(0, stage));
        (store, boss)
    }

    fn ctx(now: u64, stage: u32) -> BossStepContext {
        BossStepContext {
            now,
            dt_secs: 0.033,
            stage,
            add_hp_scale: 1.0,
        }
    }

    fn ai(store: &EntityStore, boss: EntityId) -> &BossAi {
        store.enemy(boss).unwrap().boss.as_ref().unwrap()
    }

    #[test]
    fn test_attack_cooldown_floor() {
        assert_eq!(attack_cooldown_ms(5), 2900);
        assert_eq!(attack_cooldown_ms(20), 2000);
        assert_eq!(attack_cooldown_ms(40), 1400);
        assert_eq!(attack_cooldown_ms(1000), 1400);
    }

    #[test]
    fn test_stage_scaled_numbers() {
        assert_eq!(dash_count(5), 2);
        assert_eq!(dash_count(10), 3);
        assert_eq!(summon_count(5), 2);
        assert_eq!(summon_count(20), 4);
        assert_eq!(summon_count(40), 4);
        assert_eq!(laser_damage(10), 37);
        assert_approx_eq!(dash_speed(10), 965.0, 1e-3);
    }

    #[test]
    fn test_idle_boss_chases_nearest_player() {
        let (mut store, boss) = arena_with_boss(5);
        let mut rng = StdRng::seed_from_u64(1);
        let events = step_boss(&mut store, boss, ctx(100, 5), &mut rng);
        assert!(events.is_empty());
        assert!(store.enemy(boss).unwrap().pos.x > 1000.0);
        assert!(ai(&store, boss).is_idle());
    }

    #[test]
    fn test_warn_is_broadcast_before_damage() {
        let (mut store, boss) = arena_with_boss(5);
        let mut rng = StdRng::seed_from_u64(7);
        let due = ai(&store, boss).next_attack_at;
        let events = step_boss(&mut store, boss, ctx(due, 5), &mut rng);
        assert_eq!(events.len(), 1);
        match &events[0] {
            BossEvent::Broadcast(ServerMessage::BossAttack { phase, .. }) => {
                assert!(phase.is_telegraph());
            }
            other => panic!("expected telegraph, got {:?}", other),
        }
        assert!(store.hazards().is_empty());
        assert!(ai(&store, boss).phase().is_some());
    }

    #[test]
    fn test_laser_creates_five_hazards() {
        let (mut store, boss) = arena_with_boss(5);
        let mut rng = StdRng::seed_from_u64(1);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.enter(BossState::LaserWarn, 0, LASER_WARN_MS);
        }
        step_boss(&mut store, boss, ctx(LASER_WARN_MS, 5), &mut rng);
        assert_eq!(store.hazards().len(), LASER_LINES);
        assert!(store.hazards().iter().all(|h| h.damage == laser_damage(5)));
        assert_eq!(ai(&store, boss).state, BossState::Laser);

        step_boss(&mut store, boss, ctx(LASER_WARN_MS + LASER_ACTIVE_MS, 5), &mut rng);
        assert!(ai(&store, boss).is_idle());
    }

    #[test]
    fn test_nova_pulse_and_lines() {
        let (mut store, boss) = arena_with_boss(5);
        let mut rng = StdRng::seed_from_u64(1);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.enter(BossState::NovaWarn, 0, NOVA_WARN_MS);
        }
        step_boss(&mut store, boss, ctx(NOVA_WARN_MS, 5), &mut rng);
        assert_eq!(store.hazards().len(), 1 + NOVA_LINES);
        let points = store
            .hazards()
            .iter()
            .filter(|h| matches!(h.shape, HazardShape::Point { .. }))
            .count();
        assert_eq!(points, 1);
    }

    #[test]
    fn test_dash_hits_once_per_window() {
        let (mut store, boss) = arena_with_boss(5);
        store.player_mut(1).unwrap().pos = Vec2::new(1020.0, 800.0);
        let mut rng = StdRng::seed_from_u64(1);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.dir = Vec2::new(0.0, 1.0);
            ai.enter(BossState::Dash, 0, DASH_MAX_MS);
        }
        let mut ctx0 = ctx(10, 5);
        ctx0.dt_secs = 0.0;
        let first = step_boss(&mut store, boss, ctx0, &mut rng);
        assert_eq!(first, vec![BossEvent::Hit { victim: 1, damage: dash_damage(5) }]);
        let mut ctx1 = ctx(100, 5);
        ctx1.dt_secs = 0.0;
        assert!(step_boss(&mut store, boss, ctx1, &mut rng).is_empty());
        let mut ctx2 = ctx(190, 5);
        ctx2.dt_secs = 0.0;
        assert_eq!(step_boss(&mut store, boss, ctx2, &mut rng).len(), 1);
    }

    #[test]
    fn test_dash_combo_then_idle() {
        let (mut store, boss) = arena_with_boss(5);
        let mut rng = StdRng::seed_from_u64(1);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.combo_left = 1;
            ai.enter(BossState::Dash, 0, DASH_MAX_MS);
        }
        step_boss(&mut store, boss, ctx(DASH_MAX_MS, 5), &mut rng);
        assert_eq!(ai(&store, boss).state, BossState::DashWarn);
        assert_eq!(ai(&store, boss).state_until, DASH_MAX_MS + DASH_COMBO_WARN_MS);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.enter(BossState::Dash, 1000, DASH_MAX_MS);
        }
        step_boss(&mut store, boss, ctx(1000 + DASH_MAX_MS, 5), &mut rng);
        let ai = ai(&store, boss);
        assert!(ai.is_idle());
        assert_eq!(ai.next_attack_at, 1000 + DASH_MAX_MS + attack_cooldown_ms(5));
    }

    #[test]
    fn test_summon_spawns_adds() {
        let (mut store, boss) = arena_with_boss(20);
        let mut rng = StdRng::seed_from_u64(1);
        {
            let ai = store.enemy_mut(boss).unwrap().boss.as_mut().unwrap();
            ai.enter(BossState::SummonWarn, 0, SUMMON_WARN_MS);
        }
        let events = step_boss(&mut store, boss, ctx(SUMMON_WARN_MS, 20), &mut rng);
        let spawned = events
            .iter()
            .filter(|e| matches!(e, BossEvent::Spawned(_)))
            .count();
        assert_eq!(spawned, 4);
        assert_eq!(store.living_enemy_count(), 5);
        assert!(store
            .enemies()
            .filter(|e| !e.is_boss())
            .all(|e| e.kind != EnemyKind::Scout));
    }

    #[test]
    fn test_fan_geometry() {
        let lines = fan(Vec2::ZERO, Vec2::new(1.0, 0.0), 5, 22.0, 900.0, 14.0);
        assert_eq!(lines.len(), 5);
        // middle line points straight along the aim
        assert_approx_eq!(lines[2].bx, 900.0, 1e-2);
        assert_approx_eq!(lines[2].by, 0.0, 1e-2);
        let far = Vec2::new(lines[0].bx, lines[0].by);
        assert!(point_segment_distance(far, Vec2::ZERO, Vec2::new(900.0, 0.0)) > 100.0);
    }
}
