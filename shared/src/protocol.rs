//! Wire protocol shared by the server and any client.
//!
//! Message variants are renamed to their dotted channel names (`pvp.damage`,
//! `coop.revive.hold`, ...) so self-describing encodings see the same names
//! the game clients use. The UDP adapter frames everything with bincode.

use serde::{Deserialize, Serialize};

/// Server-assigned identifier of one connected session.
pub type SessionId = u32;
/// Room-scoped identifier of an enemy or hazard.
pub type EntityId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Duel,
    Survival,
    Coop,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duel => "duel",
            Self::Survival => "survival",
            Self::Coop => "coop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Waiting,
    Countdown,
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Scout,
    Tank,
    Elite,
    Miniboss,
    Boss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    Basic,
    Skill,
}

/// Every ability a player can use or rank up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityId {
    Basic,
    Cleave,
    Bolt,
    Shockwave,
    Dash,
    Power,
    Haste,
    Precision,
    Wisdom,
    Regen,
    Vitality,
    Swiftness,
}

impl AbilityId {
    /// Abilities offered on level-up, in offer order.
    pub const RANKABLE: [AbilityId; 10] = [
        AbilityId::Cleave,
        AbilityId::Bolt,
        AbilityId::Shockwave,
        AbilityId::Power,
        AbilityId::Haste,
        AbilityId::Precision,
        AbilityId::Wisdom,
        AbilityId::Regen,
        AbilityId::Vitality,
        AbilityId::Swiftness,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cleave => "cleave",
            Self::Bolt => "bolt",
            Self::Shockwave => "shockwave",
            Self::Dash => "dash",
            Self::Power => "power",
            Self::Haste => "haste",
            Self::Precision => "precision",
            Self::Wisdom => "wisdom",
            Self::Regen => "regen",
            Self::Vitality => "vitality",
            Self::Swiftness => "swiftness",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let ability = match key.trim() {
            "basic" => Self::Basic,
            "cleave" => Self::Cleave,
            "bolt" => Self::Bolt,
            "shockwave" => Self::Shockwave,
            "dash" => Self::Dash,
            "power" => Self::Power,
            "haste" => Self::Haste,
            "precision" => Self::Precision,
            "wisdom" => Self::Wisdom,
            "regen" => Self::Regen,
            "vitality" => Self::Vitality,
            "swiftness" => Self::Swiftness,
            _ => return None,
        };
        Some(ability)
    }

    pub fn is_rankable(&self) -> bool {
        Self::RANKABLE.contains(self)
    }

    /// Skills that deal damage through a `pve.damage`/`pvp.damage` claim.
    pub fn is_offensive_skill(&self) -> bool {
        matches!(self, Self::Cleave | Self::Bolt | Self::Shockwave)
    }
}

/// What a damage result or hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRef {
    Player(SessionId),
    Enemy(EntityId),
}

/// A client's claim that one of its attacks connected.
///
/// `claimed_damage` is informational only; the server recomputes damage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageClaim {
    pub kind: AttackKind,
    pub ability: String,
    pub target_id: Option<u32>,
    pub claimed_damage: f32,
    pub aim_x: f32,
    pub aim_y: f32,
    pub hit_id: Option<String>,
}

impl DamageClaim {
    pub fn basic(target_id: Option<u32>, aim_x: f32, aim_y: f32) -> Self {
        Self {
            kind: AttackKind::Basic,
            ability: AbilityId::Basic.key().to_string(),
            target_id,
            claimed_damage: 0.0,
            aim_x,
            aim_y,
            hit_id: None,
        }
    }

    pub fn skill(ability: AbilityId, target_id: Option<u32>, aim_x: f32, aim_y: f32) -> Self {
        Self {
            kind: AttackKind::Skill,
            ability: ability.key().to_string(),
            ..Self::basic(target_id, aim_x, aim_y)
        }
    }

    pub fn with_hit_id(mut self, hit_id: impl Into<String>) -> Self {
        self.hit_id = Some(hit_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    #[serde(rename = "state")]
    State {
        move_x: f32,
        move_y: f32,
        aim_x: f32,
        aim_y: f32,
    },
    #[serde(rename = "pvp.damage")]
    PvpDamage(DamageClaim),
    #[serde(rename = "pve.damage")]
    PveDamage(DamageClaim),
    #[serde(rename = "pvp.fx")]
    PvpFx { payload: String },
    #[serde(rename = "pvp.levelup.pick")]
    LevelUpPick { key: String },
    #[serde(rename = "pvp.move")]
    PvpMove { x: f32, y: f32 },
    #[serde(rename = "pvp.ping")]
    Ping { client_time: u64 },
    #[serde(rename = "coop.revive.hold")]
    ReviveHold { active: bool },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::PvpDamage(_) => "pvp.damage",
            Self::PveDamage(_) => "pve.damage",
            Self::PvpFx { .. } => "pvp.fx",
            Self::LevelUpPick { .. } => "pvp.levelup.pick",
            Self::PvpMove { .. } => "pvp.move",
            Self::Ping { .. } => "pvp.ping",
            Self::ReviveHold { .. } => "coop.revive.hold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A duelist was reduced to zero hp.
    Ko,
    /// A duelist left a running match.
    Forfeit,
    /// Both duelists went down on the same tick.
    Draw,
    /// The final co-op stage was cleared.
    StageClear,
    /// Every co-op player was down at once.
    Wipe,
    /// The survival player died.
    Death,
    /// Every player left.
    Abandoned,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ko => "ko",
            Self::Forfeit => "forfeit",
            Self::Draw => "draw",
            Self::StageClear => "stage_clear",
            Self::Wipe => "wipe",
            Self::Death => "death",
            Self::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRejectCode {
    AuthFailed,
    RoomFull,
    MatchInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickError {
    NoProfile,
    NoUnspent,
    MaxRank,
    InvalidKey,
}

impl PickError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoProfile => "no_profile",
            Self::NoUnspent => "no_unspent",
            Self::MaxRank => "max_rank",
            Self::InvalidKey => "invalid_key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BossPhase {
    DashWarn,
    Dash,
    LaserWarn,
    Laser,
    NovaWarn,
    Nova,
    SummonWarn,
    Summon,
}

impl BossPhase {
    pub fn is_telegraph(&self) -> bool {
        matches!(
            self,
            Self::DashWarn | Self::LaserWarn | Self::NovaWarn | Self::SummonWarn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub ax: f32,
    pub ay: f32,
    pub bx: f32,
    pub by: f32,
    pub half_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub session: SessionId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub facing_x: f32,
    pub facing_y: f32,
    pub hp: u32,
    pub max_hp: u32,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub x: f32,
    pub y: f32,
    pub hp: u32,
    pub max_hp: u32,
    pub boss_phase: Option<BossPhase>,
}

/// Revive state of one session, pushed only when it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviveView {
    pub can_hold: bool,
    pub hold_active: bool,
    pub being_revived: bool,
    pub target: Option<SessionId>,
    pub reviver: Option<SessionId>,
    pub started_at: Option<u64>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    #[serde(rename = "join.rejected")]
    JoinRejected { code: JoinRejectCode },
    #[serde(rename = "match.waiting")]
    MatchWaiting {
        mode: MatchMode,
        players: u32,
        needed: u32,
    },
    #[serde(rename = "match.start")]
    MatchStart {
        mode: MatchMode,
        countdown_ms: u64,
        players: Vec<PlayerSnapshot>,
    },
    #[serde(rename = "match.go")]
    MatchGo { server_time: u64 },
    #[serde(rename = "match.end")]
    MatchEnd {
        reason: EndReason,
        winner: Option<SessionId>,
        loser: Option<SessionId>,
        stage: u32,
        elapsed_ms: u64,
    },
    #[serde(rename = "combat.hit")]
    CombatHit {
        attacker: SessionId,
        target: TargetRef,
        ability: AbilityId,
        damage: u32,
        crit: bool,
    },
    #[serde(rename = "pvp.damage")]
    PvpDamage {
        attacker: SessionId,
        target: SessionId,
        damage: u32,
        hp: u32,
        max_hp: u32,
        crit: bool,
    },
    #[serde(rename = "pve.damage")]
    PveDamage {
        source: TargetRef,
        target: TargetRef,
        damage: u32,
        hp: u32,
        max_hp: u32,
        crit: bool,
    },
    #[serde(rename = "pve.spawn")]
    PveSpawn { enemy: EnemySnapshot },
    #[serde(rename = "pve.sync")]
    PveSync {
        tick: u64,
        enemies: Vec<EnemySnapshot>,
    },
    #[serde(rename = "pve.boss.attack")]
    BossAttack {
        boss: EntityId,
        phase: BossPhase,
        x: f32,
        y: f32,
        dir_x: f32,
        dir_y: f32,
        duration_ms: u64,
        radius: f32,
        segments: Vec<LineSegment>,
    },
    #[serde(rename = "coop.stage")]
    CoopStage {
        stage: u32,
        kills: u32,
        goal: u32,
        boss_stage: bool,
    },
    #[serde(rename = "coop.revive.status")]
    ReviveStatus(ReviveView),
    #[serde(rename = "coop.revive.done")]
    ReviveDone {
        reviver: SessionId,
        target: SessionId,
        hp: u32,
    },
    #[serde(rename = "pvp.profile")]
    Profile {
        session: SessionId,
        user_id: String,
        name: String,
        rating: i32,
        wins: u32,
        losses: u32,
        matches: u32,
    },
    #[serde(rename = "pvp.progress")]
    Progress {
        session: SessionId,
        level: u32,
        xp: u32,
        xp_to_next: u32,
        unspent: u32,
    },
    #[serde(rename = "pvp.level")]
    Level {
        session: SessionId,
        level: u32,
        hp: u32,
        max_hp: u32,
    },
    #[serde(rename = "levelup.offer")]
    LevelUpOffer {
        offer_id: u64,
        options: Vec<AbilityId>,
        expires_in_ms: u64,
    },
    #[serde(rename = "levelup.applied")]
    LevelUpApplied {
        ok: bool,
        ability: Option<AbilityId>,
        rank: u8,
        reason: Option<PickError>,
        auto: bool,
        unspent: u32,
    },
    #[serde(rename = "pvp.pong")]
    Pong { client_time: u64, server_time: u64 },
    #[serde(rename = "pvp.fx")]
    Fx { from: SessionId, payload: String },
    #[serde(rename = "state.sync")]
    StateSync {
        tick: u64,
        elapsed_ms: u64,
        players: Vec<PlayerSnapshot>,
    },
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRejected { .. } => "join.rejected",
            Self::MatchWaiting { .. } => "match.waiting",
            Self::MatchStart { .. } => "match.start",
            Self::MatchGo { .. } => "match.go",
            Self::MatchEnd { .. } => "match.end",
            Self::CombatHit { .. } => "combat.hit",
            Self::PvpDamage { .. } => "pvp.damage",
            Self::PveDamage { .. } => "pve.damage",
            Self::PveSpawn { .. } => "pve.spawn",
            Self::PveSync { .. } => "pve.sync",
            Self::BossAttack { .. } => "pve.boss.attack",
            Self::CoopStage { .. } => "coop.stage",
            Self::ReviveStatus(_) => "coop.revive.status",
            Self::ReviveDone { .. } => "coop.revive.done",
            Self::Profile { .. } => "pvp.profile",
            Self::Progress { .. } => "pvp.progress",
            Self::Level { .. } => "pvp.level",
            Self::LevelUpOffer { .. } => "levelup.offer",
            Self::LevelUpApplied { .. } => "levelup.applied",
            Self::Pong { .. } => "pvp.pong",
            Self::Fx { .. } => "pvp.fx",
            Self::StateSync { .. } => "state.sync",
        }
    }
}

/// Datagram envelope used by the UDP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        token: String,
        mode: MatchMode,
        party_key: Option<String>,
    },
    Client(ClientMessage),
    Disconnect,
    Server(ServerMessage),
}
