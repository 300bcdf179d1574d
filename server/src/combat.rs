//! Server-side validation and resolution of damage claims.
//!
//! Clients only claim that an attack connected. Every claim runs through a
//! fixed pipeline and is silently dropped at the first failing step; the
//! damage that gets applied is always recomputed here.

use crate::state::EntityStore;
use arena_shared::{AbilityId, AttackKind, DamageClaim, MatchMode, SessionId, TargetRef, Vec2};
use log::trace;
use rand::Rng;
use std::collections::{HashMap, VecDeque};

/// Arc value meaning "any direction".
pub const OMNI_ARC: f32 = -1.0;

pub const PVP_MIN_INTERVAL_MS: u64 = 45;
pub const PVE_MIN_INTERVAL_MS: u64 = 28;
pub const HIT_ID_TTL_MS: u64 = 5000;
/// Past this many guard entries, ones older than the longest interval are pruned.
const LAST_CLAIM_SOFT_CAP: usize = 256;
pub const HIT_ID_CAP: usize = 10_000;
pub const MIN_COOLDOWN_MS: u64 = 40;
pub const CRIT_MULTIPLIER: f32 = 1.6;
pub const MAX_CRIT_CHANCE: f32 = 0.75;
pub const PVE_ENV_MULTIPLIER: f32 = 1.06;
pub const LIFE_STEAL_RATIO: f32 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilitySpec {
    pub range: f32,
    /// Minimum cosine between aim and the attacker->target direction.
    pub arc_dot: f32,
    pub cooldown_ms: u64,
    pub base_damage: Option<f32>,
    /// Window after a cast start in which further distinct targets count.
    pub burst_ms: u64,
}

/// Table entry for an active ability; passives have none.
pub fn ability_spec(ability: AbilityId) -> Option<AbilitySpec> {
    let spec = match ability {
        AbilityId::Basic => AbilitySpec {
            range: 860.0,
            arc_dot: 0.5,
            cooldown_ms: 260,
            base_damage: None,
            burst_ms: 90,
        },
        AbilityId::Cleave => AbilitySpec {
            range: 170.0,
            arc_dot: 0.35,
            cooldown_ms: 900,
            base_damage: Some(22.0),
            burst_ms: 140,
        },
        AbilityId::Bolt => AbilitySpec {
            range: 980.0,
            arc_dot: 0.8,
            cooldown_ms: 1400,
            base_damage: Some(30.0),
            burst_ms: 120,
        },
        AbilityId::Shockwave => AbilitySpec {
            range: 240.0,
            arc_dot: OMNI_ARC,
            cooldown_ms: 3200,
            base_damage: Some(38.0),
            burst_ms: 140,
        },
        AbilityId::Dash => AbilitySpec {
            range: 260.0,
            arc_dot: OMNI_ARC,
            cooldown_ms: 2400,
            base_damage: None,
            burst_ms: 0,
        },
        _ => return None,
    };
    Some(spec)
}

pub fn cooldown_ms(base_ms: u64, fire_rate_mul: f32) -> u64 {
    let scaled = (base_ms as f32 * fire_rate_mul.max(0.2)).round() as u64;
    scaled.max(MIN_COOLDOWN_MS)
}

fn env_multiplier(pve: bool) -> f32 {
    if pve {
        PVE_ENV_MULTIPLIER
    } else {
        1.0
    }
}

pub fn basic_damage(level: u32, atk_mul: f32, crit_mul: f32, pve: bool) -> u32 {
    let raw = (5.8 + level as f32 * 0.65) * env_multiplier(pve) * atk_mul * crit_mul;
    let cap = if pve { 32.0 } else { 26.0 };
    raw.round().clamp(1.0, cap) as u32
}

pub fn skill_damage(base: f32, level: u32, rank: u8, atk_mul: f32, crit_mul: f32, pve: bool) -> u32 {
    let level_mul = 1.0 + level.saturating_sub(1) as f32 * 0.08;
    let rank_mul = 1.0 + f32::from(rank) * 0.08;
    let raw = base * level_mul * env_multiplier(pve) * atk_mul * rank_mul * crit_mul;
    let cap = if pve { 180.0 } else { 120.0 };
    raw.round().clamp(1.0, cap) as u32
}

/// Expiring set of consumed hit ids, bounded to [`HIT_ID_CAP`] entries.
#[derive(Debug)]
pub struct HitLedger {
    ttl_ms: u64,
    cap: usize,
    seen: HashMap<String, u64>,
    order: VecDeque<(String, u64)>,
}

impl Default for HitLedger {
    fn default() -> Self {
        Self::new(HIT_ID_TTL_MS, HIT_ID_CAP)
    }
}

impl HitLedger {
    pub fn new(ttl_ms: u64, cap: usize) -> Self {
        Self {
            ttl_ms,
            cap: cap.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn is_consumed(&self, key: &str, now: u64) -> bool {
        self.seen
            .get(key)
            .map_or(false, |at| now.saturating_sub(*at) < self.ttl_ms)
    }

    pub fn consume(&mut self, key: String, now: u64) {
        self.seen.insert(key.clone(), now);
        self.order.push_back((key, now));
        // Re-consumed keys leave stale entries behind in `order`.
        if self.seen.len() > self.cap || self.order.len() > self.cap {
            self.evict(now);
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drops expired keys first, then the oldest ones, down to the cap.
    fn evict(&mut self, now: u64) {
        let ttl = self.ttl_ms;
        self.seen.retain(|_, at| now.saturating_sub(*at) < ttl);
        let seen = &self.seen;
        self.order
            .retain(|(key, at)| seen.get(key).map_or(false, |current| current == at));

        while self.seen.len() > self.cap {
            let Some((key, at)) = self.order.pop_front() else {
                break;
            };
            if self.seen.get(&key) == Some(&at) {
                self.seen.remove(&key);
            }
        }
    }
}

/// Which message a claim arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pvp,
    Pve,
}

/// Why a claim was dropped. Never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotRunning,
    AttackerDown,
    TooFrequent,
    Replay,
    PvpDisabled,
    NoTarget,
    UnknownAbility,
    OutOfRange,
    OutOfArc,
    OnCooldown,
    AlreadyHit,
    NotLearned,
}

/// Room state the resolver reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext {
    pub now: u64,
    pub running: bool,
    pub pvp_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHit {
    pub attacker: SessionId,
    pub target: TargetRef,
    pub ability: AbilityId,
    pub damage: u32,
    pub crit: bool,
    pub target_hp: u32,
    pub target_max_hp: u32,
    /// Hp restored to the attacker by life-steal.
    pub healed: u32,
}

impl ResolvedHit {
    pub fn killed(&self) -> bool {
        self.target_hp == 0
    }
}

#[derive(Debug, Clone)]
struct CastState {
    started_at: u64,
    ready_at: u64,
    targets: Vec<TargetRef>,
}

#[derive(Debug)]
pub struct CombatResolver {
    mode: MatchMode,
    last_claim: HashMap<(SessionId, Channel, TargetRef), u64>,
    ledger: HitLedger,
    casts: HashMap<(SessionId, AbilityId), CastState>,
}

impl CombatResolver {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            last_claim: HashMap::new(),
            ledger: HitLedger::default(),
            casts: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &HitLedger {
        &self.ledger
    }

    /// Forgets the guard and cooldown state of a departed session.
    pub fn forget(&mut self, session: SessionId) {
        self.last_claim.retain(|(s, _, _), _| *s != session);
        self.casts.retain(|(s, _), _| *s != session);
    }

    /// Runs `claim` through the validation pipeline and applies it.
    pub fn resolve(
        &mut self,
        store: &mut EntityStore,
        channel: Channel,
        attacker: SessionId,
        claim: &DamageClaim,
        ctx: ClaimContext,
        rng: &mut impl Rng,
    ) -> Result<ResolvedHit, Rejection> {
        let result = self.try_resolve(store, channel, attacker, claim, ctx, rng);
        if let Err(reason) = result {
            trace!(
                "Dropped {:?} claim from {} ({}): {:?}",
                channel,
                attacker,
                claim.ability,
                reason
            );
        }
        result
    }

    fn try_resolve(
        &mut self,
        store: &mut EntityStore,
        channel: Channel,
        attacker: SessionId,
        claim: &DamageClaim,
        ctx: ClaimContext,
        rng: &mut impl Rng,
    ) -> Result<ResolvedHit, Rejection> {
        let now = ctx.now;
        if !ctx.running {
            return Err(Rejection::NotRunning);
        }
        let (attacker_pos, attacker_facing, level, profile) = match store.player(attacker) {
            Some(p) if p.is_alive() => (p.pos, p.facing, p.level(), p.profile.clone()),
            _ => return Err(Rejection::AttackerDown),
        };

        let target = match channel {
            Channel::Pvp => {
                if !ctx.pvp_enabled {
                    return Err(Rejection::PvpDisabled);
                }
                resolve_player_target(store, attacker, claim.target_id)?
            }
            Channel::Pve => resolve_enemy_target(store, claim.target_id)?,
        };

        self.check_interval(attacker, channel, target, now)?;

        let dedup_key = claim
            .hit_id
            .as_ref()
            .map(|hit_id| self.dedup_key(attacker, target, hit_id));
        if let Some(key) = &dedup_key {
            if self.ledger.is_consumed(key, now) {
                return Err(Rejection::Replay);
            }
        }

        let ability = claimed_ability(claim)?;
        let spec = ability_spec(ability).ok_or(Rejection::UnknownAbility)?;

        let target_pos = target_position(store, target).ok_or(Rejection::NoTarget)?;
        let to_target = target_pos - attacker_pos;
        if to_target.magnitude() > spec.range * profile.range_mul {
            return Err(Rejection::OutOfRange);
        }
        if spec.arc_dot > OMNI_ARC {
            let mut aim = Vec2::new(claim.aim_x, claim.aim_y).sanitized().normalize();
            if aim == Vec2::ZERO {
                aim = attacker_facing;
            }
            let dir = to_target.normalize();
            // Point-blank targets are always inside the arc.
            if dir != Vec2::ZERO && aim.dot(&dir) < spec.arc_dot {
                return Err(Rejection::OutOfArc);
            }
        }

        let burst = self.check_cooldown(attacker, ability, target, now)?;

        let rank = profile.rank(ability);
        if ability != AbilityId::Basic && rank == 0 {
            return Err(Rejection::NotLearned);
        }

        let cooldown = cooldown_ms(spec.cooldown_ms, profile.fire_rate_mul);
        self.commit_cast(attacker, ability, target, now, cooldown, burst);

        let crit = rng.gen::<f32>() < profile.crit_chance.min(MAX_CRIT_CHANCE);
        let crit_mul = if crit { CRIT_MULTIPLIER } else { 1.0 };
        let pve = channel == Channel::Pve;
        let damage = match spec.base_damage {
            Some(base) => skill_damage(base, level, rank, profile.atk_mul, crit_mul, pve),
            None => basic_damage(level, profile.atk_mul, crit_mul, pve),
        };

        if let Some(key) = dedup_key {
            self.ledger.consume(key, now);
        }

        let (target_hp, target_max_hp) = apply_damage(store, target, damage);
        let healed = if pve && profile.has_life_steal() {
            life_steal(store, attacker, damage)
        } else {
            0
        };

        Ok(ResolvedHit {
            attacker,
            target,
            ability,
            damage,
            crit,
            target_hp,
            target_max_hp,
            healed,
        })
    }

    /// Consumes the cooldown of a non-damaging ability such as dash.
    pub fn try_cast(&mut self, attacker: SessionId, ability: AbilityId, fire_rate_mul: f32, now: u64) -> bool {
        let Some(spec) = ability_spec(ability) else {
            return false;
        };
        if let Some(cast) = self.casts.get(&(attacker, ability)) {
            if now < cast.ready_at {
                return false;
            }
        }
        let cooldown = cooldown_ms(spec.cooldown_ms, fire_rate_mul);
        self.casts.insert(
            (attacker, ability),
            CastState {
                started_at: now,
                ready_at: now + cooldown,
                targets: Vec::new(),
            },
        );
        true
    }

    fn check_interval(
        &mut self,
        attacker: SessionId,
        channel: Channel,
        target: TargetRef,
        now: u64,
    ) -> Result<(), Rejection> {
        let min = match channel {
            Channel::Pvp => PVP_MIN_INTERVAL_MS,
            Channel::Pve => PVE_MIN_INTERVAL_MS,
        };
        let key = (attacker, channel, target);
        if let Some(at) = self.last_claim.get(&key) {
            if now.saturating_sub(*at) < min {
                return Err(Rejection::TooFrequent);
            }
        }
        self.last_claim.insert(key, now);
        if self.last_claim.len() > LAST_CLAIM_SOFT_CAP {
            self.last_claim
                .retain(|_, at| now.saturating_sub(*at) < PVP_MIN_INTERVAL_MS);
        }
        Ok(())
    }

    /// Ok(true) when the claim joins a cast still in its burst window.
    fn check_cooldown(
        &self,
        attacker: SessionId,
        ability: AbilityId,
        target: TargetRef,
        now: u64,
    ) -> Result<bool, Rejection> {
        let Some(cast) = self.casts.get(&(attacker, ability)) else {
            return Ok(false);
        };
        if now >= cast.ready_at {
            return Ok(false);
        }
        let burst_ms = ability_spec(ability).map_or(0, |s| s.burst_ms);
        if now.saturating_sub(cast.started_at) > burst_ms {
            return Err(Rejection::OnCooldown);
        }
        if cast.targets.contains(&target) {
            return Err(Rejection::AlreadyHit);
        }
        Ok(true)
    }

    fn commit_cast(
        &mut self,
        attacker: SessionId,
        ability: AbilityId,
        target: TargetRef,
        now: u64,
        cooldown: u64,
        burst: bool,
    ) {
        if burst {
            if let Some(cast) = self.casts.get_mut(&(attacker, ability)) {
                cast.targets.push(target);
                return;
            }
        }
        self.casts.insert(
            (attacker, ability),
            CastState {
                started_at: now,
                ready_at: now + cooldown,
                targets: vec![target],
            },
        );
    }

    fn dedup_key(&self, attacker: SessionId, target: TargetRef, hit_id: &str) -> String {
        let target = match target {
            TargetRef::Player(id) => format!("p{}", id),
            TargetRef::Enemy(id) => format!("e{}", id),
        };
        format!("{}:{}:{}:{}", self.mode.as_str(), attacker, target, hit_id)
    }
}

fn claimed_ability(claim: &DamageClaim) -> Result<AbilityId, Rejection> {
    match claim.kind {
        AttackKind::Basic => Ok(AbilityId::Basic),
        AttackKind::Skill => match AbilityId::from_key(&claim.ability) {
            Some(ability) if ability.is_offensive_skill() => Ok(ability),
            _ => Err(Rejection::UnknownAbility),
        },
    }
}

fn resolve_player_target(
    store: &EntityStore,
    attacker: SessionId,
    target_id: Option<u32>,
) -> Result<TargetRef, Rejection> {
    let explicit = target_id.filter(|id| *id != attacker && store.player(*id).is_some());
    let session = explicit
        .or_else(|| store.other_session(attacker))
        .ok_or(Rejection::NoTarget)?;
    match store.player(session) {
        Some(p) if p.is_alive() => Ok(TargetRef::Player(session)),
        _ => Err(Rejection::NoTarget),
    }
}

fn resolve_enemy_target(store: &EntityStore, target_id: Option<u32>) -> Result<TargetRef, Rejection> {
    let id = target_id.ok_or(Rejection::NoTarget)?;
    match store.enemy(id) {
        Some(e) if e.is_alive() => Ok(TargetRef::Enemy(id)),
        _ => Err(Rejection::NoTarget),
    }
}

fn target_position(store: &EntityStore, target: TargetRef) -> Option<Vec2> {
    match target {
        TargetRef::Player(id) => store.player(id).map(|p| p.pos),
        TargetRef::Enemy(id) => store.enemy(id).map(|e| e.pos),
    }
}

/// Returns the target's `(hp, max_hp)` after the hit.
fn apply_damage(store: &mut EntityStore, target: TargetRef, damage: u32) -> (u32, u32) {
    match target {
        TargetRef::Player(id) => store.player_mut(id).map_or((0, 0), |p| {
            p.take_damage(damage);
            (p.hp, p.max_hp)
        }),
        TargetRef::Enemy(id) => store.enemy_mut(id).map_or((0, 0), |e| {
            e.hp = e.hp.saturating_sub(damage);
            (e.hp, e.max_hp)
        }),
    }
}

fn life_steal(store: &mut EntityStore, attacker: SessionId, damage: u32) -> u32 {
    let Some(player) = store.player_mut(attacker) else {
        return 0;
    };
    player.profile.life_steal_buffer += damage as f32 * LIFE_STEAL_RATIO;
    let whole = player.profile.life_steal_buffer.floor();
    if whole < 1.0 {
        return 0;
    }
    player.profile.life_steal_buffer -= whole;
    player.heal(whole as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PlayerEntity;
    use crate::progression::LIFE_STEAL_SET;
    use arena_shared::{Arena, EnemyKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RUNNING: ClaimContext = ClaimContext {
        now: 1000,
        running: true,
        pvp_enabled: true,
    };

    fn at(now: u64) -> ClaimContext {
        ClaimContext { now, ..RUNNING }
    }

    fn duel_store(distance: f32) -> EntityStore {
        let mut store = EntityStore::new(Arena::default());
        store.add_player(PlayerEntity::new(1, "a".into(), "A".into(), Vec2::new(500.0, 800.0), 100));
        store.add_player(PlayerEntity::new(
            2,
            "b".into(),
            "B".into(),
            Vec2::new(500.0 + distance, 800.0),
            100,
        ));
        store
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_basic_damage_by_level() {
        assert_eq!(basic_damage(1, 1.0, 1.0, false), 6);
        assert_eq!(basic_damage(10, 1.0, 1.0, false), 12);
        assert_eq!(basic_damage(1, 1.0, 1.0, true), 7);
        assert_eq!(basic_damage(60, 1.5, 1.6, false), 26);
        assert_eq!(basic_damage(60, 1.5, 1.6, true), 32);
    }

    #[test]
    fn test_skill_damage_clamps() {
        assert_eq!(skill_damage(22.0, 1, 1, 1.0, 1.0, false), 24);
        assert_eq!(skill_damage(38.0, 40, 5, 1.5, 1.6, false), 120);
        assert_eq!(skill_damage(38.0, 40, 5, 1.5, 1.6, true), 180);
    }

    #[test]
    fn test_cooldown_floor() {
        assert_eq!(cooldown_ms(260, 1.0), 260);
        assert_eq!(cooldown_ms(260, 0.0), 52);
        assert_eq!(cooldown_ms(100, 0.1), 40);
    }

    #[test]
    fn test_basic_hit_in_range() {
        let mut store = duel_store(500.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        let hit = resolver
            .resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng())
            .unwrap();
        assert_eq!(hit.damage, 6);
        assert_eq!(hit.target, TargetRef::Player(2));
        assert_eq!(store.player(2).unwrap().hp, 94);
    }

    #[test]
    fn test_claimed_damage_ignored() {
        let mut store = duel_store(500.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let mut claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        claim.claimed_damage = 9999.0;
        let hit = resolver
            .resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng())
            .unwrap();
        assert_eq!(hit.damage, 6);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut store = duel_store(900.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng()),
            Err(Rejection::OutOfRange)
        );
        assert_eq!(store.player(2).unwrap().hp, 100);
    }

    #[test]
    fn test_outside_arc_rejected() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), -1.0, 0.0);
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng()),
            Err(Rejection::OutOfArc)
        );
    }

    #[test]
    fn test_zero_aim_uses_facing() {
        let mut store = duel_store(300.0);
        store.player_mut(1).unwrap().facing = Vec2::new(-1.0, 0.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 0.0, 0.0);
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng()),
            Err(Rejection::OutOfArc)
        );
    }

    #[test]
    fn test_cooldown_applies_once() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        let mut rng = rng();
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1000), &mut rng).is_ok());
        // same target inside the burst window
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1050), &mut rng),
            Err(Rejection::AlreadyHit)
        );
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1200), &mut rng),
            Err(Rejection::OnCooldown)
        );
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1260), &mut rng).is_ok());
        assert_eq!(store.player(2).unwrap().hp, 88);
    }

    #[test]
    fn test_min_interval_guard() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        let mut rng = rng();
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1000), &mut rng).is_ok());
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1030), &mut rng),
            Err(Rejection::TooFrequent)
        );
    }

    #[test]
    fn test_min_interval_keyed_on_resolved_target() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let mut rng = rng();
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1000), &mut rng).is_ok());
        // an unknown id falls back to the same opponent
        let bogus = DamageClaim::basic(Some(9999), 1.0, 0.0);
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &bogus, at(1010), &mut rng),
            Err(Rejection::TooFrequent)
        );

        for i in 0..3000u32 {
            let bogus = DamageClaim::basic(Some(10_000 + i), 1.0, 0.0);
            let _ = resolver.resolve(&mut store, Channel::Pvp, 1, &bogus, at(1100 + u64::from(i)), &mut rng);
        }
        assert!(resolver.last_claim.len() <= 1);
    }

    #[test]
    fn test_burst_allows_distinct_targets() {
        let mut store = EntityStore::new(Arena::default());
        store.add_player(PlayerEntity::new(1, "a".into(), "A".into(), Vec2::new(500.0, 800.0), 120));
        let e1 = store.spawn_enemy(EnemyKind::Tank, Vec2::new(600.0, 800.0), 1.0);
        let e2 = store.spawn_enemy(EnemyKind::Tank, Vec2::new(650.0, 800.0), 1.0);
        let mut resolver = CombatResolver::new(MatchMode::Coop);
        let mut rng = rng();

        let first = DamageClaim::basic(Some(e1), 1.0, 0.0);
        let second = DamageClaim::basic(Some(e2), 1.0, 0.0);
        assert!(resolver.resolve(&mut store, Channel::Pve, 1, &first, at(1000), &mut rng).is_ok());
        assert!(resolver.resolve(&mut store, Channel::Pve, 1, &second, at(1060), &mut rng).is_ok());
        // burst is over, second target is on cooldown now
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pve, 1, &first, at(1100), &mut rng),
            Err(Rejection::OnCooldown)
        );
    }

    #[test]
    fn test_hit_id_replay_applies_once() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0).with_hit_id("h1");
        let mut rng = rng();
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1000), &mut rng).is_ok());
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(2000), &mut rng),
            Err(Rejection::Replay)
        );
        assert_eq!(store.player(2).unwrap().hp, 94);
        assert_eq!(resolver.ledger().len(), 1);
    }

    #[test]
    fn test_rejected_claim_does_not_consume_hit_id() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let wrong_way = DamageClaim::basic(Some(2), -1.0, 0.0).with_hit_id("h1");
        let right_way = DamageClaim::basic(Some(2), 1.0, 0.0).with_hit_id("h1");
        let mut rng = rng();
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &wrong_way, at(1000), &mut rng).is_err());
        assert!(resolver.resolve(&mut store, Channel::Pvp, 1, &right_way, at(1100), &mut rng).is_ok());
    }

    #[test]
    fn test_unlearned_skill_keeps_cooldown() {
        let mut store = duel_store(100.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::skill(AbilityId::Cleave, Some(2), 1.0, 0.0);
        let mut rng = rng();
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, at(1000), &mut rng),
            Err(Rejection::NotLearned)
        );
        store.player_mut(1).unwrap().profile.add_rank(AbilityId::Cleave).unwrap();
        let hit = resolver
            .resolve(&mut store, Channel::Pvp, 1, &claim, at(1100), &mut rng)
            .unwrap();
        assert_eq!(hit.ability, AbilityId::Cleave);
        assert_eq!(hit.damage, 24);
    }

    #[test]
    fn test_pvp_fallback_target() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        let claim = DamageClaim::basic(None, 1.0, 0.0);
        let hit = resolver
            .resolve(&mut store, Channel::Pvp, 1, &claim, RUNNING, &mut rng())
            .unwrap();
        assert_eq!(hit.target, TargetRef::Player(2));
    }

    #[test]
    fn test_pvp_disabled_and_not_running() {
        let mut store = duel_store(300.0);
        let mut resolver = CombatResolver::new(MatchMode::Coop);
        let claim = DamageClaim::basic(Some(2), 1.0, 0.0);
        let coop = ClaimContext {
            pvp_enabled: false,
            ..RUNNING
        };
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, coop, &mut rng()),
            Err(Rejection::PvpDisabled)
        );
        let waiting = ClaimContext {
            running: false,
            ..RUNNING
        };
        assert_eq!(
            resolver.resolve(&mut store, Channel::Pvp, 1, &claim, waiting, &mut rng()),
            Err(Rejection::NotRunning)
        );
    }

    #[test]
    fn test_life_steal_accumulates() {
        let mut store = EntityStore::new(Arena::default());
        let mut player = PlayerEntity::new(1, "a".into(), "A".into(), Vec2::new(500.0, 800.0), 120);
        for ability in LIFE_STEAL_SET {
            player.profile.add_rank(ability).unwrap();
        }
        player.hp = 50;
        store.add_player(player);
        let target = store.spawn_enemy(EnemyKind::Miniboss, Vec2::new(600.0, 800.0), 1.0);
        let mut resolver = CombatResolver::new(MatchMode::Coop);
        let claim = DamageClaim::skill(AbilityId::Cleave, Some(target), 1.0, 0.0);
        let hit = resolver
            .resolve(&mut store, Channel::Pve, 1, &claim, RUNNING, &mut rng())
            .unwrap();
        let expected = (hit.damage as f32 * LIFE_STEAL_RATIO).floor() as u32;
        assert_eq!(hit.healed, expected);
        assert_eq!(store.player(1).unwrap().hp, 50 + expected);
    }

    #[test]
    fn test_ledger_evicts_down_to_cap() {
        let mut ledger = HitLedger::new(5000, 3);
        for i in 0..5u64 {
            ledger.consume(format!("k{}", i), i);
        }
        assert_eq!(ledger.len(), 3);
        assert!(!ledger.is_consumed("k0", 5));
        assert!(ledger.is_consumed("k4", 5));
        assert!(!ledger.is_consumed("k4", 5004));
    }

    #[test]
    fn test_ledger_bounded_when_ids_are_reused() {
        let mut ledger = HitLedger::new(5000, 100);
        for window in 0..120u64 {
            for i in 0..50u64 {
                ledger.consume(format!("k{}", i), window * 5000 + i);
            }
        }
        assert_eq!(ledger.len(), 50);
        assert!(ledger.order.len() <= 100);
    }

    #[test]
    fn test_dash_cast_uses_cooldown() {
        let mut resolver = CombatResolver::new(MatchMode::Duel);
        assert!(resolver.try_cast(1, AbilityId::Dash, 1.0, 0));
        assert!(!resolver.try_cast(1, AbilityId::Dash, 1.0, 2399));
        assert!(resolver.try_cast(1, AbilityId::Dash, 1.0, 2400));
        assert!(!resolver.try_cast(1, AbilityId::Power, 1.0, 0));
    }
}
