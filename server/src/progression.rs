//! Experience, levels and ability ranks.
//!
//! Every rank change recomputes the derived multipliers of the
//! [`CombatProfile`]; combat reads only the derived values.

use crate::config::ModeRules;
use arena_shared::{AbilityId, PickError};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

pub const MAX_RANK: u8 = 5;
pub const LEVEL_UP_HEAL: u32 = 12;
pub const OFFER_SIZE: usize = 3;
pub const OFFER_TIMEOUT_MS: u64 = 10_000;
pub const MAX_CRIT_FROM_RANKS: f32 = 0.5;
pub const RANGE_BONUS: f32 = 1.15;

/// Ranks that must all be above zero for the range bonus.
pub const RANGE_BONUS_SET: [AbilityId; 3] = [AbilityId::Cleave, AbilityId::Bolt, AbilityId::Shockwave];
/// Ranks that must all be above zero for life-steal on PvE hits.
pub const LIFE_STEAL_SET: [AbilityId; 3] = [AbilityId::Cleave, AbilityId::Power, AbilityId::Vitality];

/// Experience needed to advance from `level` to `level + 1`.
pub fn xp_to_next(level: u32) -> u32 {
    let raw = (30.0 * (level.max(1) as f64).powf(1.35)).floor();
    (raw as u32).max(1)
}

/// Per-player combat multipliers derived from ability ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatProfile {
    pub atk_mul: f32,
    pub fire_rate_mul: f32,
    pub range_mul: f32,
    pub move_mul: f32,
    pub crit_chance: f32,
    pub xp_gain_mul: f32,
    pub max_hp_mul: f32,
    /// Hit points regenerated per second.
    pub hp_regen: f32,
    pub ranks: BTreeMap<AbilityId, u8>,
    pub unspent: u32,
    pub life_steal_buffer: f32,
    pub regen_buffer: f32,
}

impl Default for CombatProfile {
    fn default() -> Self {
        Self {
            atk_mul: 1.0,
            fire_rate_mul: 1.0,
            range_mul: 1.0,
            move_mul: 1.0,
            crit_chance: 0.0,
            xp_gain_mul: 1.0,
            max_hp_mul: 1.0,
            hp_regen: 0.0,
            ranks: BTreeMap::new(),
            unspent: 0,
            life_steal_buffer: 0.0,
            regen_buffer: 0.0,
        }
    }
}

impl CombatProfile {
    pub fn rank(&self, ability: AbilityId) -> u8 {
        self.ranks.get(&ability).copied().unwrap_or(0)
    }

    pub fn has_all(&self, set: &[AbilityId]) -> bool {
        set.iter().all(|ability| self.rank(*ability) > 0)
    }

    pub fn has_life_steal(&self) -> bool {
        self.has_all(&LIFE_STEAL_SET)
    }

    /// Raises `ability` by one rank and recomputes the derived stats.
    pub fn add_rank(&mut self, ability: AbilityId) -> Result<u8, PickError> {
        if !ability.is_rankable() {
            return Err(PickError::InvalidKey);
        }
        let rank = self.rank(ability);
        if rank >= MAX_RANK {
            return Err(PickError::MaxRank);
        }
        self.ranks.insert(ability, rank + 1);
        self.recompute();
        Ok(rank + 1)
    }

    pub fn recompute(&mut self) {
        let r = |ability| f32::from(self.rank(ability));
        let atk_mul = 1.0 + 0.1 * r(AbilityId::Power);
        let fire_rate_mul = 0.92f32.powi(i32::from(self.rank(AbilityId::Haste)));
        let crit_chance = (0.05 * r(AbilityId::Precision)).min(MAX_CRIT_FROM_RANKS);
        let xp_gain_mul = 1.0 + 0.15 * r(AbilityId::Wisdom);
        let hp_regen = 0.8 * r(AbilityId::Regen);
        let max_hp_mul = 1.0 + 0.08 * r(AbilityId::Vitality);
        let move_mul = 1.0 + 0.05 * r(AbilityId::Swiftness);
        let range_mul = if self.has_all(&RANGE_BONUS_SET) {
            RANGE_BONUS
        } else {
            1.0
        };

        self.atk_mul = atk_mul;
        self.fire_rate_mul = fire_rate_mul;
        self.crit_chance = crit_chance;
        self.xp_gain_mul = xp_gain_mul;
        self.hp_regen = hp_regen;
        self.max_hp_mul = max_hp_mul;
        self.move_mul = move_mul;
        self.range_mul = range_mul;
    }

    /// Abilities that can still be ranked, in canonical order.
    pub fn open_abilities(&self) -> Vec<AbilityId> {
        AbilityId::RANKABLE
            .iter()
            .copied()
            .filter(|ability| self.rank(*ability) < MAX_RANK)
            .collect()
    }

    /// Draws up to three distinct abilities for a level-up offer.
    pub fn roll_offer(&self, rng: &mut impl Rng) -> Vec<AbilityId> {
        let mut open = self.open_abilities();
        open.shuffle(rng);
        open.truncate(OFFER_SIZE);
        open
    }
}

/// Maximum hp for `level` under `rules`, before the level-up heal.
pub fn max_hp_for(level: u32, rules: &ModeRules, max_hp_mul: f32) -> u32 {
    let base = rules.base_max_hp + rules.max_hp_per_level * level.saturating_sub(1);
    ((base as f32) * max_hp_mul).round().max(1.0) as u32
}

/// Level/xp/hp block of one player, advanced by [`grant_xp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experience {
    pub level: u32,
    pub xp: u32,
}

impl Default for Experience {
    fn default() -> Self {
        Self { level: 1, xp: 0 }
    }
}

impl Experience {
    pub fn xp_to_next(&self) -> u32 {
        xp_to_next(self.level)
    }
}

/// Adds `amount` experience and returns how many levels were gained.
pub fn grant_xp(exp: &mut Experience, amount: u32) -> u32 {
    exp.xp = exp.xp.saturating_add(amount);
    let mut gained = 0;
    while exp.xp >= xp_to_next(exp.level) {
        exp.xp -= xp_to_next(exp.level);
        exp.level += 1;
        gained += 1;
    }
    gained
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::MatchMode;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xp_to_next_first_level() {
        assert_eq!(xp_to_next(1), 30);
        assert_eq!(xp_to_next(0), 30);
        assert_eq!(xp_to_next(2), 76);
    }

    #[test]
    fn test_xp_to_next_strictly_increasing() {
        for level in 1..200 {
            assert!(xp_to_next(level + 1) > xp_to_next(level), "level {}", level);
        }
    }

    #[test]
    fn test_grant_xp_multiple_levels() {
        let mut exp = Experience::default();
        let gained = grant_xp(&mut exp, 30 + 76 + 5);
        assert_eq!(gained, 2);
        assert_eq!(exp.level, 3);
        assert_eq!(exp.xp, 5);
        assert_eq!(grant_xp(&mut exp, 1), 0);
    }

    #[test]
    fn test_rank_multipliers() {
        let mut profile = CombatProfile::default();
        profile.add_rank(AbilityId::Haste).unwrap();
        profile.add_rank(AbilityId::Haste).unwrap();
        assert_approx_eq!(profile.fire_rate_mul, 0.92 * 0.92, 1e-6);

        for _ in 0..5 {
            profile.add_rank(AbilityId::Power).unwrap();
        }
        assert_approx_eq!(profile.atk_mul, 1.5, 1e-6);
        assert_eq!(profile.add_rank(AbilityId::Power), Err(PickError::MaxRank));
    }

    #[test]
    fn test_crit_chance_capped() {
        let mut profile = CombatProfile::default();
        for _ in 0..5 {
            profile.add_rank(AbilityId::Precision).unwrap();
        }
        assert!(profile.crit_chance <= MAX_CRIT_FROM_RANKS);
        profile.ranks.insert(AbilityId::Precision, 40);
        profile.recompute();
        assert_approx_eq!(profile.crit_chance, MAX_CRIT_FROM_RANKS, 1e-6);
    }

    #[test]
    fn test_range_bonus_needs_all_three() {
        let mut profile = CombatProfile::default();
        profile.add_rank(AbilityId::Cleave).unwrap();
        profile.add_rank(AbilityId::Bolt).unwrap();
        assert_eq!(profile.range_mul, 1.0);
        profile.add_rank(AbilityId::Shockwave).unwrap();
        assert_approx_eq!(profile.range_mul, RANGE_BONUS, 1e-6);
    }

    #[test]
    fn test_life_steal_set() {
        let mut profile = CombatProfile::default();
        assert!(!profile.has_life_steal());
        for ability in LIFE_STEAL_SET {
            profile.add_rank(ability).unwrap();
        }
        assert!(profile.has_life_steal());
    }

    #[test]
    fn test_non_rankable_rejected() {
        let mut profile = CombatProfile::default();
        assert_eq!(profile.add_rank(AbilityId::Basic), Err(PickError::InvalidKey));
        assert_eq!(profile.add_rank(AbilityId::Dash), Err(PickError::InvalidKey));
    }

    #[test]
    fn test_offer_excludes_maxed() {
        let mut profile = CombatProfile::default();
        for ability in AbilityId::RANKABLE {
            if ability != AbilityId::Wisdom {
                profile.ranks.insert(ability, MAX_RANK);
            }
        }
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(profile.roll_offer(&mut rng), vec![AbilityId::Wisdom]);

        let fresh = CombatProfile::default().roll_offer(&mut rng);
        assert_eq!(fresh.len(), OFFER_SIZE);
    }

    #[test]
    fn test_max_hp_per_mode() {
        let duel = ModeRules::for_mode(MatchMode::Duel);
        let coop = ModeRules::for_mode(MatchMode::Coop);
        assert_eq!(max_hp_for(1, &duel, 1.0), 100);
        assert_eq!(max_hp_for(3, &duel, 1.0), 112);
        assert_eq!(max_hp_for(1, &coop, 1.0), 120);
        assert_eq!(max_hp_for(2, &coop, 1.08), 138);
    }
}
