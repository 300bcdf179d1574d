//! One match room: the authoritative simulation of a single duel, survival
//! run or co-op session.
//!
//! The room is a plain state machine driven from outside with the current
//! time in milliseconds. It never sleeps or spawns; everything it wants to
//! say goes through its [`Outbox`], and timers go through its [`Scheduler`].
//! That keeps it deterministic for a given seed and easy to test.

use crate::auth::VerifiedSession;
use crate::boss::{step_boss, BossEvent, BossStepContext};
use crate::combat::{ability_spec, Channel, ClaimContext, CombatResolver, ResolvedHit};
use crate::config::{LevelUpStyle, ModeRules, Pacing, RoomConfig};
use crate::director::{EnemyDirector, StageOutcome, StageTracker};
use crate::entities::{LevelUpOffer, PlayerEntity};
use crate::intake::{sanitize_claim, InputIntake, InputIntent};
use crate::outbox::{Envelope, Outbox, Transport};
use crate::progression::{grant_xp, max_hp_for, LEVEL_UP_HEAL, OFFER_TIMEOUT_MS};
use crate::revive::ReviveTracker;
use crate::scheduler::{RoomTask, Scheduler};
use crate::state::EntityStore;
use crate::store::RatingRecord;
use arena_shared::{
    AbilityId, ClientMessage, DamageClaim, EndReason, EntityId, JoinRejectCode, MatchMode,
    MatchPhase, PickError, ServerMessage, SessionId, TargetRef, Vec2, PLAYER_RADIUS, PLAYER_SPEED,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub type RoomId = u64;

/// Longest simulated step; longer gaps are treated as lag, not motion.
pub const MAX_DELTA_MS: u64 = 50;

/// Outcome of a rated match, handed to the profile store by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub room: RoomId,
    pub reason: EndReason,
    pub winner_session: SessionId,
    pub winner_user: String,
    pub winner_name: String,
    pub loser_session: SessionId,
    pub loser_user: String,
    pub loser_name: String,
}

pub struct MatchRoom {
    id: RoomId,
    rules: ModeRules,
    config: RoomConfig,
    phase: MatchPhase,
    rng: StdRng,
    store: EntityStore,
    intake: InputIntake,
    combat: CombatResolver,
    director: EnemyDirector,
    stages: StageTracker,
    revive: ReviveTracker,
    scheduler: Scheduler,
    outbox: Outbox,
    tick: u64,
    last_tick_at: Option<u64>,
    started_at: Option<u64>,
    last_sync_at: Option<u64>,
    next_offer_id: u64,
    pending_result: Option<MatchResult>,
    disposed: bool,
}

impl MatchRoom {
    pub fn new(id: RoomId, mode: MatchMode, config: RoomConfig) -> Self {
        let rules = ModeRules::for_mode(mode);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            store: EntityStore::new(config.arena()),
            combat: CombatResolver::new(mode),
            director: EnemyDirector::new(rules.clone()),
            stages: StageTracker::new(config.final_stage),
            rules,
            config,
            phase: MatchPhase::Waiting,
            rng,
            intake: InputIntake::new(),
            revive: ReviveTracker::new(),
            scheduler: Scheduler::new(),
            outbox: Outbox::new(),
            tick: 0,
            last_tick_at: None,
            started_at: None,
            last_sync_at: None,
            next_offer_id: 0,
            pending_result: None,
            disposed: false,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn mode(&self) -> MatchMode {
        self.rules.mode
    }

    pub fn rules(&self) -> &ModeRules {
        &self.rules
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.store.sessions().to_vec()
    }

    pub fn player_count(&self) -> usize {
        self.store.player_count()
    }

    pub fn is_full(&self) -> bool {
        self.store.player_count() >= self.rules.max_players
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn player(&self, session: SessionId) -> Option<&PlayerEntity> {
        self.store.player(session)
    }

    pub fn entities(&self) -> &EntityStore {
        &self.store
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn stage(&self) -> &StageTracker {
        &self.stages
    }

    pub fn stage_mut(&mut self) -> &mut StageTracker {
        &mut self.stages
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        self.started_at.map_or(0, |at| now.saturating_sub(at))
    }

    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    pub fn flush_outbox(&mut self, transport: &dyn Transport) {
        let sessions = self.store.sessions().to_vec();
        self.outbox.flush(transport, &sessions);
    }

    /// Result of a concluded rated match, handed out once.
    pub fn take_match_result(&mut self) -> Option<MatchResult> {
        self.pending_result.take()
    }

    // --- lifecycle ---

    pub fn join(
        &mut self,
        session: SessionId,
        identity: VerifiedSession,
        rating: Option<RatingRecord>,
        now: u64,
    ) -> Result<(), JoinRejectCode> {
        if self.phase != MatchPhase::Waiting || self.disposed {
            return Err(JoinRejectCode::MatchInProgress);
        }
        if self.is_full() {
            return Err(JoinRejectCode::RoomFull);
        }

        let pos = self.spawn_position(self.store.player_count());
        let mut player = PlayerEntity::new(
            session,
            identity.user_id,
            identity.name,
            pos,
            max_hp_for(1, &self.rules, 1.0),
        );
        player.rating = rating;
        let profile = player.rating.as_ref().map(|r| ServerMessage::Profile {
            session,
            user_id: r.user_id.clone(),
            name: player.name.clone(),
            rating: r.rating,
            wins: r.wins,
            losses: r.losses,
            matches: r.matches,
        });
        self.store.add_player(player);
        info!(
            "Room {} ({}): session {} joined ({}/{})",
            self.id,
            self.rules.mode.as_str(),
            session,
            self.store.player_count(),
            self.rules.required_players
        );

        if let Some(profile) = profile {
            self.outbox.send(session, profile);
        }
        self.send_progress(session);

        if self.store.player_count() < self.rules.required_players {
            self.outbox.broadcast(ServerMessage::MatchWaiting {
                mode: self.rules.mode,
                players: self.store.player_count() as u32,
                needed: self.rules.required_players as u32,
            });
        } else {
            self.begin_countdown(now);
        }
        Ok(())
    }

    pub fn leave(&mut self, session: SessionId, now: u64) {
        let Some(player) = self.store.remove_player(session) else {
            return;
        };
        self.intake.remove(session);
        self.combat.forget(session);
        self.revive.forget(session);
        self.scheduler
            .cancel_where(|task| matches!(task, RoomTask::AutoPick { session: s, .. } if *s == session));
        info!("Room {}: session {} left during {:?}", self.id, session, self.phase);

        match self.phase {
            MatchPhase::Waiting => {
                if self.store.player_count() == 0 {
                    self.disposed = true;
                }
            }
            MatchPhase::Countdown => {
                self.scheduler.cancel_where(|task| *task == RoomTask::CountdownGo);
                self.phase = MatchPhase::Waiting;
                if self.store.player_count() == 0 {
                    self.disposed = true;
                } else {
                    self.outbox.broadcast(ServerMessage::MatchWaiting {
                        mode: self.rules.mode,
                        players: self.store.player_count() as u32,
                        needed: self.rules.required_players as u32,
                    });
                }
            }
            MatchPhase::Running => {
                if self.rules.mode == MatchMode::Duel {
                    if let Some(winner) = self.store.sessions().first().copied() {
                        self.end_match(EndReason::Forfeit, Some(winner), Some(player), now);
                        return;
                    }
                }
                if self.store.player_count() == 0 {
                    self.end_match(EndReason::Abandoned, None, None, now);
                }
            }
            MatchPhase::Ended => {}
        }
    }

    fn begin_countdown(&mut self, now: u64) {
        self.phase = MatchPhase::Countdown;
        self.outbox.broadcast(ServerMessage::MatchStart {
            mode: self.rules.mode,
            countdown_ms: self.config.countdown_ms,
            players: self.store.player_snapshots(),
        });
        self.scheduler
            .schedule(now + self.config.countdown_ms, RoomTask::CountdownGo);
        info!("Room {}: countdown started", self.id);
    }

    fn go(&mut self, now: u64) {
        self.phase = MatchPhase::Running;
        self.started_at = Some(now);
        self.last_tick_at = Some(now);
        self.director.reset();
        self.outbox.broadcast(ServerMessage::MatchGo { server_time: now });
        if self.rules.pacing == Pacing::Staged {
            self.broadcast_stage();
        }
        info!("Room {}: match is live", self.id);
    }

    fn end_match(
        &mut self,
        reason: EndReason,
        winner: Option<SessionId>,
        loser: Option<PlayerEntity>,
        now: u64,
    ) {
        if self.phase == MatchPhase::Ended {
            return;
        }
        self.phase = MatchPhase::Ended;
        let loser_session = loser.as_ref().map(|p| p.session);
        let stage = if self.rules.pacing == Pacing::Staged {
            self.stages.stage
        } else {
            0
        };
        self.outbox.broadcast(ServerMessage::MatchEnd {
            reason,
            winner,
            loser: loser_session,
            stage,
            elapsed_ms: self.elapsed_ms(now),
        });
        info!(
            "Room {}: match ended ({}), winner {:?}, loser {:?}",
            self.id,
            reason.as_str(),
            winner,
            loser_session
        );

        if self.rules.rated {
            if let (Some(winner), Some(loser)) = (winner.and_then(|s| self.store.player(s)), loser) {
                self.pending_result = Some(MatchResult {
                    room: self.id,
                    reason,
                    winner_session: winner.session,
                    winner_user: winner.user_id.clone(),
                    winner_name: winner.name.clone(),
                    loser_session: loser.session,
                    loser_user: loser.user_id,
                    loser_name: loser.name,
                });
            }
        }

        self.revive.clear();
        self.scheduler.cancel_all();
        self.scheduler
            .schedule(now + self.config.dispose_delay_ms, RoomTask::Dispose);
    }

    /// Cancels every timer and marks the room for removal.
    pub fn dispose(&mut self) {
        self.scheduler.cancel_all();
        self.disposed = true;
        debug!("Room {} disposed", self.id);
    }

    fn spawn_position(&self, index: usize) -> Vec2 {
        let arena = self.store.arena;
        let center = arena.center();
        let offset = match self.rules.mode {
            MatchMode::Duel => arena.width / 6.0,
            MatchMode::Coop => 60.0,
            MatchMode::Survival => 0.0,
        };
        let side = if index % 2 == 0 { -1.0 } else { 1.0 };
        arena.clamp(Vec2::new(center.x + side * offset, center.y))
    }

    // --- inbound messages ---

    pub fn handle_message(&mut self, session: SessionId, message: ClientMessage, now: u64) {
        if self.store.player(session).is_none() || self.disposed {
            return;
        }
        match message {
            ClientMessage::State {
                move_x,
                move_y,
                aim_x,
                aim_y,
            } => {
                self.intake
                    .submit(session, InputIntent::from_raw(move_x, move_y, aim_x, aim_y));
            }
            ClientMessage::PvpDamage(claim) => self.handle_claim(session, Channel::Pvp, &claim, now),
            ClientMessage::PveDamage(claim) => self.handle_claim(session, Channel::Pve, &claim, now),
            ClientMessage::PvpFx { payload } => {
                self.outbox
                    .broadcast_except(session, ServerMessage::Fx { from: session, payload });
            }
            ClientMessage::LevelUpPick { key } => self.pick(session, &key, false, now),
            ClientMessage::PvpMove { x, y } => self.dash(session, Vec2::new(x, y), now),
            ClientMessage::Ping { client_time } => {
                self.outbox.send(
                    session,
                    ServerMessage::Pong {
                        client_time,
                        server_time: now,
                    },
                );
            }
            ClientMessage::ReviveHold { active } => {
                if self.rules.revive_enabled {
                    self.revive.set_requested(session, active);
                }
            }
        }
    }

    fn handle_claim(&mut self, session: SessionId, channel: Channel, claim: &DamageClaim, now: u64) {
        let claim = sanitize_claim(claim);
        let ctx = ClaimContext {
            now,
            running: self.phase == MatchPhase::Running,
            pvp_enabled: self.rules.pvp_enabled,
        };
        let Ok(hit) = self
            .combat
            .resolve(&mut self.store, channel, session, &claim, ctx, &mut self.rng)
        else {
            return;
        };
        self.broadcast_hit(&hit);

        match hit.target {
            TargetRef::Player(_) => {
                if hit.killed() {
                    self.check_end(now);
                }
            }
            TargetRef::Enemy(id) => {
                if hit.killed() {
                    self.enemy_killed(id, Some(session), now);
                }
            }
        }
    }

    fn broadcast_hit(&mut self, hit: &ResolvedHit) {
        self.outbox.broadcast(ServerMessage::CombatHit {
            attacker: hit.attacker,
            target: hit.target,
            ability: hit.ability,
            damage: hit.damage,
            crit: hit.crit,
        });
        let result = match hit.target {
            TargetRef::Player(target) => ServerMessage::PvpDamage {
                attacker: hit.attacker,
                target,
                damage: hit.damage,
                hp: hit.target_hp,
                max_hp: hit.target_max_hp,
                crit: hit.crit,
            },
            TargetRef::Enemy(_) => ServerMessage::PveDamage {
                source: TargetRef::Player(hit.attacker),
                target: hit.target,
                damage: hit.damage,
                hp: hit.target_hp,
                max_hp: hit.target_max_hp,
                crit: hit.crit,
            },
        };
        self.outbox.broadcast(result);
    }

    fn dash(&mut self, session: SessionId, destination: Vec2, now: u64) {
        if self.phase != MatchPhase::Running || !destination.is_finite() {
            return;
        }
        let (pos, fire_rate_mul, range_mul) = match self.store.player(session) {
            Some(p) if p.is_alive() => (p.pos, p.profile.fire_rate_mul, p.profile.range_mul),
            _ => return,
        };
        if !self.combat.try_cast(session, AbilityId::Dash, fire_rate_mul, now) {
            debug!("Dropped dash from {}: on cooldown", session);
            return;
        }
        let max_reach = ability_spec(AbilityId::Dash).map_or(0.0, |s| s.range) * range_mul;
        let arena = self.store.arena;
        // Clamped first so the offset below cannot overflow to infinity.
        let destination = arena.clamp(destination);
        let landed = arena.clamp(pos + (destination - pos).clamp_magnitude(max_reach));
        if let Some(player) = self.store.player_mut(session) {
            player.pos = landed;
        }
    }

    // --- progression ---

    fn grant_experience(&mut self, session: SessionId, base: u32, now: u64) {
        let rules = self.rules.clone();
        let Some(player) = self.store.player_mut(session) else {
            return;
        };
        let amount = (base as f32 * player.profile.xp_gain_mul).round() as u32;
        let gained = grant_xp(&mut player.exp, amount);

        let mut level_messages = Vec::new();
        for _ in 0..gained {
            // Levels are applied one at a time so each gets its heal.
            let level = player.exp.level;
            player.set_max_hp(max_hp_for(level, &rules, player.profile.max_hp_mul));
            if player.is_alive() {
                player.heal(LEVEL_UP_HEAL);
            }
            match rules.level_up {
                LevelUpStyle::Tokens => player.profile.unspent += 1,
                LevelUpStyle::Offer => player.queued_offers += 1,
            }
            level_messages.push(ServerMessage::Level {
                session,
                level,
                hp: player.hp,
                max_hp: player.max_hp,
            });
        }
        if gained > 0 {
            info!("Player {} reached level {}", session, player.exp.level);
        }

        for message in level_messages {
            self.outbox.broadcast(message);
        }
        self.send_progress(session);
        if gained > 0 && rules.level_up == LevelUpStyle::Offer {
            self.open_offer(session, now);
        }
    }

    fn send_progress(&mut self, session: SessionId) {
        let Some(player) = self.store.player(session) else {
            return;
        };
        let unspent = match self.rules.level_up {
            LevelUpStyle::Tokens => player.profile.unspent,
            LevelUpStyle::Offer => player.queued_offers + u32::from(player.offer.is_some()),
        };
        let message = ServerMessage::Progress {
            session,
            level: player.exp.level,
            xp: player.exp.xp,
            xp_to_next: player.exp.xp_to_next(),
            unspent,
        };
        self.outbox.send(session, message);
    }

    /// Presents the next queued offer when none is outstanding.
    fn open_offer(&mut self, session: SessionId, now: u64) {
        let Some(player) = self.store.player(session) else {
            return;
        };
        if player.offer.is_some() || player.queued_offers == 0 {
            return;
        }
        let options = player.profile.roll_offer(&mut self.rng);
        let offer_id = self.next_offer_id;
        self.next_offer_id += 1;

        let Some(player) = self.store.player_mut(session) else {
            return;
        };
        if options.is_empty() {
            // Every ability is maxed out.
            player.queued_offers = 0;
            return;
        }
        player.queued_offers -= 1;
        let task = self.scheduler.schedule(
            now + OFFER_TIMEOUT_MS,
            RoomTask::AutoPick { session, offer_id },
        );
        player.offer = Some(LevelUpOffer {
            id: offer_id,
            options: options.clone(),
            task,
        });
        self.outbox.send(
            session,
            ServerMessage::LevelUpOffer {
                offer_id,
                options,
                expires_in_ms: OFFER_TIMEOUT_MS,
            },
        );
    }

    fn pick(&mut self, session: SessionId, key: &str, auto: bool, now: u64) {
        let result = self.try_pick(session, key);
        let (unspent, current) = self.store.player(session).map_or((0, 0), |p| {
            let unspent = match self.rules.level_up {
                LevelUpStyle::Tokens => p.profile.unspent,
                LevelUpStyle::Offer => p.queued_offers,
            };
            let current = AbilityId::from_key(key).map_or(0, |a| p.profile.rank(a));
            (unspent, current)
        });

        let message = match result {
            Ok((ability, rank)) => ServerMessage::LevelUpApplied {
                ok: true,
                ability: Some(ability),
                rank,
                reason: None,
                auto,
                unspent,
            },
            Err(reason) => {
                debug!("Pick {:?} by {} failed: {}", key, session, reason.as_str());
                ServerMessage::LevelUpApplied {
                    ok: false,
                    ability: AbilityId::from_key(key),
                    rank: current,
                    reason: Some(reason),
                    auto,
                    unspent,
                }
            }
        };
        self.outbox.send(session, message);

        if result.is_ok() {
            self.refresh_max_hp(session);
            self.send_progress(session);
            if self.rules.level_up == LevelUpStyle::Offer {
                self.open_offer(session, now);
            }
        }
    }

    fn try_pick(&mut self, session: SessionId, key: &str) -> Result<(AbilityId, u8), PickError> {
        let style = self.rules.level_up;
        let player = self.store.player_mut(session).ok_or(PickError::NoProfile)?;
        let ability = AbilityId::from_key(key)
            .filter(|a| a.is_rankable())
            .ok_or(PickError::InvalidKey)?;

        match style {
            LevelUpStyle::Tokens => {
                if player.profile.unspent == 0 {
                    return Err(PickError::NoUnspent);
                }
                let rank = player.profile.add_rank(ability)?;
                player.profile.unspent -= 1;
                Ok((ability, rank))
            }
            LevelUpStyle::Offer => {
                let offer = player.offer.as_ref().ok_or(PickError::NoUnspent)?;
                if !offer.options.contains(&ability) {
                    return Err(PickError::InvalidKey);
                }
                let task = offer.task;
                let rank = player.profile.add_rank(ability)?;
                player.offer = None;
                self.scheduler.cancel(task);
                Ok((ability, rank))
            }
        }
    }

    fn auto_pick(&mut self, session: SessionId, offer_id: u64, now: u64) {
        let first = self
            .store
            .player(session)
            .and_then(|p| p.offer.as_ref())
            .filter(|offer| offer.id == offer_id)
            .and_then(|offer| offer.options.first().copied());
        if let Some(ability) = first {
            self.pick(session, ability.key(), true, now);
        }
    }

    fn refresh_max_hp(&mut self, session: SessionId) {
        let rules = &self.rules;
        let Some(player) = self.store.player_mut(session) else {
            return;
        };
        let max_hp = max_hp_for(player.exp.level, rules, player.profile.max_hp_mul);
        if max_hp == player.max_hp {
            return;
        }
        player.set_max_hp(max_hp);
        let message = ServerMessage::Level {
            session,
            level: player.exp.level,
            hp: player.hp,
            max_hp: player.max_hp,
        };
        self.outbox.broadcast(message);
    }

    // --- simulation ---

    pub fn tick(&mut self, now: u64) {
        if self.disposed {
            return;
        }
        self.run_due_tasks(now);
        if self.phase != MatchPhase::Running {
            return;
        }

        let dt_ms = self
            .last_tick_at
            .map_or(0, |at| now.saturating_sub(at))
            .min(MAX_DELTA_MS);
        self.last_tick_at = Some(now);
        let dt = dt_ms as f32 / 1000.0;
        self.tick += 1;

        self.integrate_players(dt);
        self.spawn_enemies(now);
        self.step_enemies(now, dt);
        self.tick_hazards(now);
        if self.rules.revive_enabled {
            self.tick_revive(now);
        }
        self.check_end(now);
        self.sync(now);
    }

    fn run_due_tasks(&mut self, now: u64) {
        for (_, task) in self.scheduler.take_due(now) {
            match task {
                RoomTask::CountdownGo => {
                    if self.phase == MatchPhase::Countdown {
                        self.go(now);
                    }
                }
                RoomTask::AutoPick { session, offer_id } => self.auto_pick(session, offer_id, now),
                RoomTask::Dispose => self.dispose(),
            }
        }
    }

    fn integrate_players(&mut self, dt: f32) {
        let arena = self.store.arena;
        for session in self.store.sessions().to_vec() {
            let intent = self.intake.latest(session);
            let Some(player) = self.store.player_mut(session) else {
                continue;
            };
            player.apply_intent_facing(&intent);
            if !player.is_alive() {
                continue;
            }
            let step = intent.move_dir.scale(PLAYER_SPEED * player.profile.move_mul * dt);
            player.pos = arena.clamp(player.pos + step);

            if player.profile.hp_regen > 0.0 && player.hp < player.max_hp {
                player.profile.regen_buffer += player.profile.hp_regen * dt;
                let whole = player.profile.regen_buffer.floor();
                if whole >= 1.0 {
                    player.profile.regen_buffer -= whole;
                    player.heal(whole as u32);
                }
            }
        }
    }

    fn spawn_enemies(&mut self, now: u64) {
        let elapsed = self.elapsed_ms(now);
        let spawned = self
            .director
            .step(&mut self.store, now, elapsed, self.stages.stage, &mut self.rng);
        self.announce_spawns(&spawned);
    }

    fn announce_spawns(&mut self, ids: &[EntityId]) {
        for id in ids {
            if let Some(enemy) = self.store.enemy(*id) {
                self.outbox.broadcast(ServerMessage::PveSpawn {
                    enemy: enemy.snapshot(),
                });
            }
        }
    }

    fn step_enemies(&mut self, now: u64, dt: f32) {
        let arena = self.store.arena;
        let stage = self.stages.stage;
        let add_hp_scale = self.director.hp_scale(self.elapsed_ms(now), stage);

        for id in self.store.enemy_ids() {
            let is_boss = self.store.enemy(id).map_or(false, |e| e.boss.is_some());
            if is_boss {
                let ctx = BossStepContext {
                    now,
                    dt_secs: dt,
                    stage,
                    add_hp_scale,
                };
                for event in step_boss(&mut self.store, id, ctx, &mut self.rng) {
                    match event {
                        BossEvent::Broadcast(message) => self.outbox.broadcast(message),
                        BossEvent::Hit { victim, damage } => {
                            self.damage_player(victim, damage, TargetRef::Enemy(id))
                        }
                        BossEvent::Spawned(add) => self.announce_spawns(&[add]),
                    }
                }
            } else if let Some(target) = self
                .store
                .enemy(id)
                .and_then(|e| self.store.nearest_living_player(e.pos))
            {
                if let Some(enemy) = self.store.enemy_mut(id) {
                    let step = (target.1 - enemy.pos).clamp_magnitude(enemy.speed * dt);
                    enemy.pos = arena.clamp(enemy.pos + step);
                }
            }

            self.contact(id, now);
        }
    }

    /// Contact damage from a chasing (or idle boss) enemy.
    fn contact(&mut self, id: EntityId, now: u64) {
        let Some(enemy) = self.store.enemy(id) else {
            return;
        };
        let chasing = enemy.boss.as_ref().map_or(true, |ai| ai.is_idle());
        if !chasing || !enemy.is_alive() || !enemy.can_contact(now) {
            return;
        }
        let reach = enemy.radius + PLAYER_RADIUS;
        let (pos, damage) = (enemy.pos, enemy.contact_damage);
        let victim = self
            .store
            .nearest_living_player(pos)
            .filter(|(_, p)| p.distance(&pos) <= reach);
        if let Some((victim, _)) = victim {
            if let Some(enemy) = self.store.enemy_mut(id) {
                enemy.last_contact_at = Some(now);
            }
            self.damage_player(victim, damage, TargetRef::Enemy(id));
        }
    }

    fn tick_hazards(&mut self, now: u64) {
        for (victim, damage, owner) in self.store.tick_hazards(now, PLAYER_RADIUS) {
            self.damage_player(victim, damage, TargetRef::Enemy(owner));
        }
    }

    fn damage_player(&mut self, session: SessionId, damage: u32, source: TargetRef) {
        let Some(player) = self.store.player_mut(session) else {
            return;
        };
        if !player.is_alive() {
            return;
        }
        let dealt = player.take_damage(damage);
        let message = ServerMessage::PveDamage {
            source,
            target: TargetRef::Player(session),
            damage: dealt,
            hp: player.hp,
            max_hp: player.max_hp,
            crit: false,
        };
        if !player.is_alive() {
            info!("Player {} is down", session);
        }
        self.outbox.broadcast(message);
    }

    fn enemy_killed(&mut self, id: EntityId, killer: Option<SessionId>, now: u64) {
        let Some(enemy) = self.store.remove_enemy(id) else {
            return;
        };
        debug!("Enemy {} ({:?}) killed by {:?}", id, enemy.kind, killer);
        if let Some(killer) = killer {
            self.grant_experience(killer, enemy.xp_reward, now);
        }
        if self.rules.pacing != Pacing::Staged {
            return;
        }
        match self.stages.record_kill(enemy.kind) {
            StageOutcome::Counted => self.broadcast_stage(),
            StageOutcome::Ignored => {}
            StageOutcome::Advanced(stage) => {
                info!("Room {}: advanced to stage {}", self.id, stage);
                self.store.clear_enemies();
                self.director.reset();
                self.broadcast_stage();
            }
            StageOutcome::Cleared => self.end_match(EndReason::StageClear, None, None, now),
        }
    }

    fn broadcast_stage(&mut self) {
        self.outbox.broadcast(ServerMessage::CoopStage {
            stage: self.stages.stage,
            kills: self.stages.kills,
            goal: self.stages.goal,
            boss_stage: self.stages.is_boss_stage(),
        });
    }

    fn tick_revive(&mut self, now: u64) {
        let result = self.revive.tick(&mut self.store, now);
        for (session, view) in result.changed {
            self.outbox.send(session, ServerMessage::ReviveStatus(view));
        }
        for done in result.completed {
            self.outbox.broadcast(ServerMessage::ReviveDone {
                reviver: done.reviver,
                target: done.target,
                hp: done.hp,
            });
        }
    }

    /// Ends the match when its mode's losing condition holds.
    fn check_end(&mut self, now: u64) {
        if self.phase != MatchPhase::Running {
            return;
        }
        let players: Vec<(SessionId, bool)> = self
            .store
            .players()
            .map(|p| (p.session, p.is_alive()))
            .collect();
        if players.is_empty() {
            self.end_match(EndReason::Abandoned, None, None, now);
            return;
        }
        let down: Vec<SessionId> = players.iter().filter(|(_, alive)| !alive).map(|(s, _)| *s).collect();
        if down.is_empty() {
            return;
        }

        match self.rules.mode {
            MatchMode::Duel => {
                if down.len() == players.len() {
                    self.end_match(EndReason::Draw, None, None, now);
                    return;
                }
                let loser = self.store.player(down[0]).cloned();
                let winner = players.iter().find(|(_, alive)| *alive).map(|(s, _)| *s);
                self.end_match(EndReason::Ko, winner, loser, now);
            }
            MatchMode::Survival => {
                let loser = self.store.player(down[0]).cloned();
                self.end_match(EndReason::Death, None, loser, now);
            }
            MatchMode::Coop => {
                if down.len() == players.len() {
                    self.end_match(EndReason::Wipe, None, None, now);
                }
            }
        }
    }

    fn sync(&mut self, now: u64) {
        let due = self
            .last_sync_at
            .map_or(true, |at| now.saturating_sub(at) >= self.config.sync_interval_ms);
        if !due {
            return;
        }
        self.last_sync_at = Some(now);
        self.outbox.broadcast(ServerMessage::StateSync {
            tick: self.tick,
            elapsed_ms: self.elapsed_ms(now),
            players: self.store.player_snapshots(),
        });
        self.outbox.broadcast(ServerMessage::PveSync {
            tick: self.tick,
            enemies: self.store.enemy_snapshots(),
        });
    }

    /// Kills an enemy outright, as if `killer` landed the last hit.
    ///
    /// Test hook for driving stage and boss transitions without fighting
    /// through them; nothing on the message path calls it.
    #[doc(hidden)]
    pub fn kill_enemy(&mut self, id: EntityId, killer: Option<SessionId>, now: u64) {
        if self.phase != MatchPhase::Running {
            warn!("Room {}: ignoring kill of {} outside a running match", self.id, id);
            return;
        }
        self.enemy_killed(id, killer, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::Recipient;
    use arena_shared::EnemyKind;

    fn config() -> RoomConfig {
        RoomConfig {
            seed: Some(42),
            ..RoomConfig::default()
        }
    }

    fn identity(user: &str) -> VerifiedSession {
        VerifiedSession {
            user_id: user.to_string(),
            name: user.to_uppercase(),
        }
    }

    fn messages(room: &mut MatchRoom) -> Vec<ServerMessage> {
        room.drain_outbox().into_iter().map(|e| e.message).collect()
    }

    /// Two joined players, countdown elapsed, match live at t=3000.
    fn live_room(mode: MatchMode) -> MatchRoom {
        let mut room = MatchRoom::new(1, mode, config());
        room.join(1, identity("a"), Some(RatingRecord::new("a")), 0).unwrap();
        room.join(2, identity("b"), Some(RatingRecord::new("b")), 0).unwrap();
        room.tick(3000);
        assert_eq!(room.phase(), MatchPhase::Running);
        room.drain_outbox();
        room
    }

    #[test]
    fn test_waiting_then_countdown() {
        let mut room = MatchRoom::new(1, MatchMode::Duel, config());
        room.join(1, identity("a"), None, 0).unwrap();
        assert_eq!(room.phase(), MatchPhase::Waiting);
        assert!(messages(&mut room)
            .iter()
            .any(|m| matches!(m, ServerMessage::MatchWaiting { players: 1, needed: 2, .. })));

        room.join(2, identity("b"), None, 10).unwrap();
        assert_eq!(room.phase(), MatchPhase::Countdown);
        room.tick(3009);
        assert_eq!(room.phase(), MatchPhase::Countdown);
        room.tick(3010);
        assert_eq!(room.phase(), MatchPhase::Running);
    }

    #[test]
    fn test_join_rejections() {
        let mut room = live_room(MatchMode::Duel);
        assert_eq!(
            room.join(3, identity("c"), None, 4000),
            Err(JoinRejectCode::MatchInProgress)
        );

        let mut survival = MatchRoom::new(2, MatchMode::Survival, config());
        survival.join(1, identity("a"), None, 0).unwrap();
        assert_eq!(survival.phase(), MatchPhase::Countdown);
        assert_eq!(
            survival.join(2, identity("b"), None, 0),
            Err(JoinRejectCode::MatchInProgress)
        );
    }

    #[test]
    fn test_ping_answers_sender_only() {
        let mut room = live_room(MatchMode::Duel);
        room.handle_message(1, ClientMessage::Ping { client_time: 77 }, 3100);
        let envelopes = room.drain_outbox();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, Recipient::Session(1));
        assert_eq!(
            envelopes[0].message,
            ServerMessage::Pong {
                client_time: 77,
                server_time: 3100
            }
        );
    }

    #[test]
    fn test_fx_rebroadcast_excludes_sender() {
        let mut room = live_room(MatchMode::Duel);
        room.handle_message(
            1,
            ClientMessage::PvpFx {
                payload: "spark".into(),
            },
            3100,
        );
        let envelopes = room.drain_outbox();
        assert_eq!(envelopes[0].to, Recipient::AllExcept(1));
    }

    #[test]
    fn test_duel_ko_produces_result() {
        let mut room = live_room(MatchMode::Duel);
        room.entities_mut().player_mut(2).unwrap().hp = 0;
        room.tick(3033);
        assert_eq!(room.phase(), MatchPhase::Ended);
        let result = room.take_match_result().unwrap();
        assert_eq!(result.reason, EndReason::Ko);
        assert_eq!(result.winner_user, "a");
        assert_eq!(result.loser_user, "b");
        assert!(room.take_match_result().is_none());
    }

    #[test]
    fn test_forfeit_on_leave() {
        let mut room = live_room(MatchMode::Duel);
        room.leave(1, 3100);
        assert_eq!(room.phase(), MatchPhase::Ended);
        let result = room.take_match_result().unwrap();
        assert_eq!(result.reason, EndReason::Forfeit);
        assert_eq!(result.winner_session, 2);
        assert_eq!(result.loser_session, 1);
    }

    #[test]
    fn test_leave_during_countdown_returns_to_waiting() {
        let mut room = MatchRoom::new(1, MatchMode::Coop, config());
        room.join(1, identity("a"), None, 0).unwrap();
        room.join(2, identity("b"), None, 0).unwrap();
        room.leave(2, 100);
        assert_eq!(room.phase(), MatchPhase::Waiting);
        room.tick(5000);
        assert_eq!(room.phase(), MatchPhase::Waiting);
    }

    #[test]
    fn test_disposes_after_delay() {
        let mut room = live_room(MatchMode::Duel);
        room.entities_mut().player_mut(2).unwrap().hp = 0;
        room.tick(3033);
        room.tick(8032);
        assert!(!room.is_disposed());
        room.tick(8033);
        assert!(room.is_disposed());
    }

    #[test]
    fn test_coop_wipe_has_no_result() {
        let mut room = live_room(MatchMode::Coop);
        room.entities_mut().player_mut(1).unwrap().hp = 0;
        room.tick(3033);
        assert_eq!(room.phase(), MatchPhase::Running);
        room.entities_mut().player_mut(2).unwrap().hp = 0;
        room.tick(3066);
        assert_eq!(room.phase(), MatchPhase::Ended);
        assert!(room.take_match_result().is_none());
    }

    #[test]
    fn test_stage_advance_clears_enemies() {
        let mut room = live_room(MatchMode::Coop);
        room.stage_mut().kills = 23;
        let id = room
            .entities_mut()
            .spawn_enemy(EnemyKind::Scout, Vec2::new(100.0, 100.0), 1.0);
        room.entities_mut()
            .spawn_enemy(EnemyKind::Scout, Vec2::new(200.0, 100.0), 1.0);
        room.kill_enemy(id, Some(1), 3100);
        assert_eq!(room.stage().stage, 2);
        assert_eq!(room.entities().living_enemy_count(), 0);
        assert!(messages(&mut room)
            .iter()
            .any(|m| matches!(m, ServerMessage::CoopStage { stage: 2, kills: 0, .. })));
    }

    #[test]
    fn test_token_pick_flow() {
        let mut room = live_room(MatchMode::Coop);
        room.handle_message(1, ClientMessage::LevelUpPick { key: "power".into() }, 3100);
        assert!(messages(&mut room).iter().any(|m| matches!(
            m,
            ServerMessage::LevelUpApplied {
                ok: false,
                reason: Some(PickError::NoUnspent),
                ..
            }
        )));

        room.entities_mut().player_mut(1).unwrap().profile.unspent = 1;
        room.handle_message(1, ClientMessage::LevelUpPick { key: "power".into() }, 3200);
        assert!(messages(&mut room).iter().any(|m| matches!(
            m,
            ServerMessage::LevelUpApplied {
                ok: true,
                rank: 1,
                unspent: 0,
                ..
            }
        )));

        room.entities_mut().player_mut(1).unwrap().profile.unspent = 1;
        room.handle_message(1, ClientMessage::LevelUpPick { key: "dash".into() }, 3300);
        assert!(messages(&mut room).iter().any(|m| matches!(
            m,
            ServerMessage::LevelUpApplied {
                ok: false,
                reason: Some(PickError::InvalidKey),
                ..
            }
        )));
    }

    #[test]
    fn test_duel_offer_auto_picks_first_option() {
        let mut room = live_room(MatchMode::Duel);
        // 30 xp is exactly one level
        room.grant_experience(1, 30, 3100);
        let offer = room.player(1).unwrap().offer.clone().unwrap();
        assert_eq!(offer.options.len(), 3);
        assert_eq!(room.player(1).unwrap().level(), 2);
        assert_eq!(room.player(1).unwrap().max_hp, 106);

        room.drain_outbox();
        room.tick(13_099);
        assert!(room.player(1).unwrap().offer.is_some());
        room.tick(13_100);
        assert!(room.player(1).unwrap().offer.is_none());
        assert_eq!(room.player(1).unwrap().profile.rank(offer.options[0]), 1);
        assert!(messages(&mut room)
            .iter()
            .any(|m| matches!(m, ServerMessage::LevelUpApplied { ok: true, auto: true, .. })));
    }

    #[test]
    fn test_queued_offers_come_one_at_a_time() {
        let mut room = live_room(MatchMode::Duel);
        room.grant_experience(1, 30 + 76, 3100);
        let player = room.player(1).unwrap();
        assert_eq!(player.level(), 3);
        assert_eq!(player.queued_offers, 1);
        let first = player.offer.clone().unwrap();

        let key = first.options[1].key().to_string();
        room.handle_message(1, ClientMessage::LevelUpPick { key }, 3200);
        let player = room.player(1).unwrap();
        assert_eq!(player.queued_offers, 0);
        assert_ne!(player.offer.as_ref().unwrap().id, first.id);
    }

    #[test]
    fn test_claim_before_go_is_dropped() {
        let mut room = MatchRoom::new(1, MatchMode::Duel, config());
        room.join(1, identity("a"), None, 0).unwrap();
        room.join(2, identity("b"), None, 0).unwrap();
        room.handle_message(
            1,
            ClientMessage::PvpDamage(DamageClaim::basic(Some(2), 1.0, 0.0)),
            100,
        );
        assert_eq!(room.player(2).unwrap().hp, 100);
    }

    #[test]
    fn test_dash_is_clamped_to_reach() {
        let mut room = live_room(MatchMode::Duel);
        let start = room.player(1).unwrap().pos;
        room.handle_message(
            1,
            ClientMessage::PvpMove {
                x: start.x,
                y: start.y + 1000.0,
            },
            3100,
        );
        let after = room.player(1).unwrap().pos;
        assert!((after.distance(&start) - 260.0).abs() < 1e-3);

        room.handle_message(1, ClientMessage::PvpMove { x: start.x, y: start.y }, 3200);
        assert_eq!(room.player(1).unwrap().pos, after);
    }

    #[test]
    fn test_dash_toward_huge_destination_still_moves() {
        let mut room = live_room(MatchMode::Duel);
        let start = room.player(1).unwrap().pos;
        room.handle_message(
            1,
            ClientMessage::PvpMove {
                x: f32::MAX,
                y: f32::MAX,
            },
            3100,
        );
        let after = room.player(1).unwrap().pos;
        assert!(after.is_finite());
        assert!(after.x > start.x && after.y > start.y);
        assert!((after.distance(&start) - 260.0).abs() < 1e-3);
    }

    #[test]
    fn test_movement_integrates_and_clamps() {
        let mut room = live_room(MatchMode::Duel);
        room.handle_message(
            1,
            ClientMessage::State {
                move_x: -1.0,
                move_y: 0.0,
                aim_x: -1.0,
                aim_y: 0.0,
            },
            3000,
        );
        let before = room.player(1).unwrap().pos;
        room.tick(3050);
        let after = room.player(1).unwrap().pos;
        assert!((before.x - after.x - 13.0).abs() < 1e-3);
        assert_eq!(room.player(1).unwrap().facing, Vec2::new(-1.0, 0.0));
    }
}
