//! Canonical entity state of one room.
//!
//! Players, enemies and hazards live in maps keyed by id and owned by the
//! room. Player iteration follows join order so ticks are deterministic for
//! a given RNG seed.

use crate::entities::{EnemyEntity, PlayerEntity};
use crate::hazards::HazardZone;
use arena_shared::{Arena, EnemyKind, EnemySnapshot, EntityId, PlayerSnapshot, SessionId, Vec2};
use log::info;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub struct EntityStore {
    pub arena: Arena,
    players: HashMap<SessionId, PlayerEntity>,
    join_order: Vec<SessionId>,
    enemies: BTreeMap<EntityId, EnemyEntity>,
    hazards: Vec<HazardZone>,
    next_enemy_id: EntityId,
    next_hazard_id: EntityId,
}

impl EntityStore {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            players: HashMap::new(),
            join_order: Vec::new(),
            enemies: BTreeMap::new(),
            hazards: Vec::new(),
            next_enemy_id: 1,
            next_hazard_id: 1,
        }
    }

    // --- players ---

    pub fn add_player(&mut self, mut player: PlayerEntity) {
        player.pos = self.arena.clamp(player.pos);
        info!(
            "Added player {} ({}) at ({:.0}, {:.0})",
            player.session, player.name, player.pos.x, player.pos.y
        );
        if !self.join_order.contains(&player.session) {
            self.join_order.push(player.session);
        }
        self.players.insert(player.session, player);
    }

    pub fn remove_player(&mut self, session: SessionId) -> Option<PlayerEntity> {
        self.join_order.retain(|s| *s != session);
        let removed = self.players.remove(&session);
        if removed.is_some() {
            info!("Removed player {}", session);
        }
        removed
    }

    pub fn player(&self, session: SessionId) -> Option<&PlayerEntity> {
        self.players.get(&session)
    }

    pub fn player_mut(&mut self, session: SessionId) -> Option<&mut PlayerEntity> {
        self.players.get_mut(&session)
    }

    pub fn sessions(&self) -> &[SessionId] {
        &self.join_order
    }

    pub fn player_count(&self) -> usize {
        self.join_order.len()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.join_order.iter().filter_map(|s| self.players.get(s))
    }

    pub fn living_players(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.players().filter(|p| p.is_alive())
    }

    /// `(session, position)` of every living player, in join order.
    pub fn living_positions(&self) -> Vec<(SessionId, Vec2)> {
        self.living_players().map(|p| (p.session, p.pos)).collect()
    }

    /// The only other connected session, when exactly two are present.
    pub fn other_session(&self, session: SessionId) -> Option<SessionId> {
        if self.join_order.len() != 2 {
            return None;
        }
        self.join_order.iter().copied().find(|s| *s != session)
    }

    pub fn nearest_living_player(&self, from: Vec2) -> Option<(SessionId, Vec2)> {
        self.living_players()
            .map(|p| (p.session, p.pos, p.pos.distance(&from)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(session, pos, _)| (session, pos))
    }

    /// Centroid of living players, or the arena center when none are alive.
    pub fn living_centroid(&self) -> Vec2 {
        let positions: Vec<Vec2> = self.living_players().map(|p| p.pos).collect();
        if positions.is_empty() {
            return self.arena.center();
        }
        let sum = positions.iter().fold(Vec2::ZERO, |acc, p| acc + *p);
        sum.scale(1.0 / positions.len() as f32)
    }

    pub fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players().map(|p| p.snapshot()).collect()
    }

    // --- enemies ---

    pub fn spawn_enemy(&mut self, kind: EnemyKind, pos: Vec2, hp_scale: f32) -> EntityId {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        let pos = self.arena.clamp(pos);
        self.enemies.insert(id, EnemyEntity::new(id, kind, pos, hp_scale));
        id
    }

    pub fn enemy(&self, id: EntityId) -> Option<&EnemyEntity> {
        self.enemies.get(&id)
    }

    pub fn enemy_mut(&mut self, id: EntityId) -> Option<&mut EnemyEntity> {
        self.enemies.get_mut(&id)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &EnemyEntity> {
        self.enemies.values()
    }

    pub fn enemy_ids(&self) -> Vec<EntityId> {
        self.enemies.keys().copied().collect()
    }

    pub fn living_enemy_count(&self) -> usize {
        self.enemies.values().filter(|e| e.is_alive()).count()
    }

    pub fn boss_alive(&self) -> bool {
        self.enemies.values().any(|e| e.is_boss() && e.is_alive())
    }

    /// Removes an enemy together with every hazard it owns.
    pub fn remove_enemy(&mut self, id: EntityId) -> Option<EnemyEntity> {
        let removed = self.enemies.remove(&id);
        if removed.is_some() {
            self.hazards.retain(|h| h.owner != id);
        }
        removed
    }

    pub fn enemy_snapshots(&self) -> Vec<EnemySnapshot> {
        self.enemies.values().map(|e| e.snapshot()).collect()
    }

    // --- hazards ---

    pub fn alloc_hazard_id(&mut self) -> EntityId {
        let id = self.next_hazard_id;
        self.next_hazard_id += 1;
        id
    }

    pub fn add_hazard(&mut self, hazard: HazardZone) {
        self.hazards.push(hazard);
    }

    pub fn hazards(&self) -> &[HazardZone] {
        &self.hazards
    }

    /// Runs every due hazard tick and drops expired or orphaned zones.
    /// Returns `(victim, damage, owner)` for each hit.
    pub fn tick_hazards(&mut self, now: u64, victim_radius: f32) -> Vec<(SessionId, u32, EntityId)> {
        let victims = self.living_positions();
        let mut hits = Vec::new();
        for hazard in &mut self.hazards {
            for session in hazard.tick(now, &victims, victim_radius) {
                hits.push((session, hazard.damage, hazard.owner));
            }
        }
        let enemies = &self.enemies;
        self.hazards
            .retain(|h| !h.is_expired(now) && enemies.contains_key(&h.owner));
        hits
    }

    /// Stage transition: every enemy and hazard goes.
    pub fn clear_enemies(&mut self) {
        self.enemies.clear();
        self.hazards.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazards::HazardShape;

    fn store_with_players() -> EntityStore {
        let mut store = EntityStore::new(Arena::default());
        store.add_player(PlayerEntity::new(1, "a".into(), "A".into(), Vec2::new(100.0, 100.0), 100));
        store.add_player(PlayerEntity::new(2, "b".into(), "B".into(), Vec2::new(300.0, 100.0), 100));
        store
    }

    #[test]
    fn test_enemy_ids_are_monotonic() {
        let mut store = store_with_players();
        let a = store.spawn_enemy(EnemyKind::Scout, Vec2::new(10.0, 10.0), 1.0);
        let b = store.spawn_enemy(EnemyKind::Scout, Vec2::new(10.0, 10.0), 1.0);
        store.remove_enemy(b);
        let c = store.spawn_enemy(EnemyKind::Tank, Vec2::new(10.0, 10.0), 1.0);
        assert!(a < b && b < c);
        // spawn positions are clamped into the arena
        assert_eq!(store.enemy(a).unwrap().pos, Vec2::new(24.0, 24.0));
    }

    #[test]
    fn test_other_session_only_for_two_players() {
        let mut store = store_with_players();
        assert_eq!(store.other_session(1), Some(2));
        store.add_player(PlayerEntity::new(3, "c".into(), "C".into(), Vec2::ZERO, 100));
        assert_eq!(store.other_session(1), None);
    }

    #[test]
    fn test_centroid_ignores_downed() {
        let mut store = store_with_players();
        assert_eq!(store.living_centroid(), Vec2::new(200.0, 100.0));
        store.player_mut(2).unwrap().hp = 0;
        assert_eq!(store.living_centroid(), Vec2::new(100.0, 100.0));
        store.player_mut(1).unwrap().hp = 0;
        assert_eq!(store.living_centroid(), store.arena.center());
    }

    #[test]
    fn test_removing_owner_removes_hazards() {
        let mut store = store_with_players();
        let boss = store.spawn_enemy(EnemyKind::Boss, Vec2::new(500.0, 500.0), 1.0);
        let id = store.alloc_hazard_id();
        store.add_hazard(HazardZone::new(
            id,
            boss,
            HazardShape::Point {
                center: Vec2::new(100.0, 100.0),
                radius: 50.0,
            },
            0,
            1000,
            100,
            10,
            100,
        ));
        assert_eq!(store.tick_hazards(0, 18.0), vec![(1, 10, boss)]);
        store.remove_enemy(boss);
        assert!(store.hazards().is_empty());
    }

    #[test]
    fn test_tick_hazards_prunes_expired() {
        let mut store = store_with_players();
        let boss = store.spawn_enemy(EnemyKind::Boss, Vec2::new(500.0, 500.0), 1.0);
        let id = store.alloc_hazard_id();
        store.add_hazard(HazardZone::new(
            id,
            boss,
            HazardShape::Point {
                center: Vec2::new(900.0, 900.0),
                radius: 10.0,
            },
            0,
            100,
            50,
            10,
            100,
        ));
        assert!(store.tick_hazards(50, 18.0).is_empty());
        assert_eq!(store.hazards().len(), 1);
        store.tick_hazards(100, 18.0);
        assert!(store.hazards().is_empty());
    }
}
