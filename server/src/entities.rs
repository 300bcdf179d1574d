use crate::boss::BossAi;
use crate::intake::InputIntent;
use crate::progression::{CombatProfile, Experience};
use crate::store::RatingRecord;
use arena_shared::{
    AbilityId, EnemyKind, EnemySnapshot, EntityId, PlayerSnapshot, SessionId, Vec2,
};

/// A pending three-card level-up offer (duel progression).
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpOffer {
    pub id: u64,
    pub options: Vec<AbilityId>,
    pub task: crate::scheduler::TaskId,
}

#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub session: SessionId,
    pub user_id: String,
    pub name: String,
    pub pos: Vec2,
    pub facing: Vec2,
    pub hp: u32,
    pub max_hp: u32,
    pub exp: Experience,
    pub profile: CombatProfile,
    pub offer: Option<LevelUpOffer>,
    /// Level-ups earned while an offer was outstanding.
    pub queued_offers: u32,
    pub rating: Option<RatingRecord>,
}

impl PlayerEntity {
    pub fn new(session: SessionId, user_id: String, name: String, pos: Vec2, max_hp: u32) -> Self {
        Self {
            session,
            user_id,
            name,
            pos,
            facing: Vec2::new(1.0, 0.0),
            hp: max_hp,
            max_hp,
            exp: Experience::default(),
            profile: CombatProfile::default(),
            offer: None,
            queued_offers: 0,
            rating: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn level(&self) -> u32 {
        self.exp.level
    }

    /// Heals up to `max_hp`, returning the amount actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.hp;
        self.hp = self.hp.saturating_add(amount).min(self.max_hp);
        self.hp - before
    }

    /// Deals damage, saturating at zero. Returns the damage actually taken.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let before = self.hp;
        self.hp = self.hp.saturating_sub(amount);
        before - self.hp
    }

    /// Changes `max_hp`, carrying any increase into current hp.
    pub fn set_max_hp(&mut self, max_hp: u32) {
        let max_hp = max_hp.max(1);
        if max_hp > self.max_hp && self.is_alive() {
            self.hp += max_hp - self.max_hp;
        }
        self.max_hp = max_hp;
        self.hp = self.hp.min(self.max_hp);
    }

    pub fn apply_intent_facing(&mut self, intent: &InputIntent) {
        let aim = intent.aim.normalize();
        if aim != Vec2::ZERO {
            self.facing = aim;
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            session: self.session,
            name: self.name.clone(),
            x: self.pos.x,
            y: self.pos.y,
            facing_x: self.facing.x,
            facing_y: self.facing.y,
            hp: self.hp,
            max_hp: self.max_hp,
            level: self.exp.level,
        }
    }
}

/// Base stats of an enemy type before stage/time scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyStats {
    pub hp: u32,
    pub speed: f32,
    pub radius: f32,
    pub contact_damage: u32,
    pub xp: u32,
}

pub fn enemy_stats(kind: EnemyKind) -> EnemyStats {
    match kind {
        EnemyKind::Scout => EnemyStats {
            hp: 18,
            speed: 130.0,
            radius: 14.0,
            contact_damage: 5,
            xp: 6,
        },
        EnemyKind::Tank => EnemyStats {
            hp: 70,
            speed: 62.0,
            radius: 22.0,
            contact_damage: 11,
            xp: 14,
        },
        EnemyKind::Elite => EnemyStats {
            hp: 120,
            speed: 98.0,
            radius: 18.0,
            contact_damage: 15,
            xp: 26,
        },
        EnemyKind::Miniboss => EnemyStats {
            hp: 360,
            speed: 82.0,
            radius: 30.0,
            contact_damage: 22,
            xp: 70,
        },
        EnemyKind::Boss => EnemyStats {
            hp: 2400,
            speed: 70.0,
            radius: 46.0,
            contact_damage: 28,
            xp: 400,
        },
    }
}

/// Minimum time between two contact hits from the same enemy.
pub const CONTACT_INTERVAL_MS: u64 = 650;

#[derive(Debug, Clone)]
pub struct EnemyEntity {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub pos: Vec2,
    pub hp: u32,
    pub max_hp: u32,
    pub speed: f32,
    pub radius: f32,
    pub contact_damage: u32,
    pub xp_reward: u32,
    pub last_contact_at: Option<u64>,
    pub boss: Option<BossAi>,
}

impl EnemyEntity {
    /// Builds an enemy with hp scaled by `hp_scale` (stage or time pressure).
    pub fn new(id: EntityId, kind: EnemyKind, pos: Vec2, hp_scale: f32) -> Self {
        let stats = enemy_stats(kind);
        let max_hp = ((stats.hp as f32) * hp_scale.max(0.1)).round().max(1.0) as u32;
        Self {
            id,
            kind,
            pos,
            hp: max_hp,
            max_hp,
            speed: stats.speed,
            radius: stats.radius,
            contact_damage: stats.contact_damage,
            xp_reward: stats.xp,
            last_contact_at: None,
            boss: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn is_boss(&self) -> bool {
        self.kind == EnemyKind::Boss
    }

    pub fn can_contact(&self, now: u64) -> bool {
        self.last_contact_at
            .map_or(true, |at| now.saturating_sub(at) >= CONTACT_INTERVAL_MS)
    }

    pub fn snapshot(&self) -> EnemySnapshot {
        EnemySnapshot {
            id: self.id,
            kind: self.kind,
            x: self.pos.x,
            y: self.pos.y,
            hp: self.hp,
            max_hp: self.max_hp,
            boss_phase: self.boss.as_ref().and_then(|ai| ai.phase()),
        }
    }
}
