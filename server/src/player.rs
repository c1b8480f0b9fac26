//! Authoritative player records and the registry that owns them
//!
//! The registry hands out ids, enforces the player cap and keeps a name to id
//! mapping so a returning player gets the same id (and with it the same
//! persisted inventory).

use crate::combat::WeaponState;
use crate::error::{Result, ServerError};
use crate::inventory::Inventory;
use log::info;
use shared::items::{self, ItemKind};
use shared::{Packet, Stats, Vec3};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CombatState {
    pub weapon: Option<WeaponState>,
    pub armor_item: Option<u32>,
    pub kills: u32,
    pub deaths: u32,
    pub alive: bool,
    pub in_combat_until: Option<Instant>,
}

impl CombatState {
    fn new() -> Self {
        Self {
            alive: true,
            ..Default::default()
        }
    }

    /// Armour rating of the worn piece, zero when bare
    pub fn armor_value(&self) -> f32 {
        self.armor_item
            .and_then(items::find)
            .map(|def| match def.kind {
                ItemKind::Armor { value } => value,
                _ => 0.0,
            })
            .unwrap_or(0.0)
    }

    pub fn in_combat(&self, now: Instant) -> bool {
        self.in_combat_until.map_or(false, |until| now < until)
    }

    /// Equipped item id, zero for bare hands
    pub fn weapon_item(&self) -> u32 {
        self.weapon.as_ref().map_or(0, |w| w.item_id)
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub stats: Stats,
    pub inventory: Inventory,
    pub combat: CombatState,
    pub last_heartbeat: Instant,
}

impl Player {
    pub fn new(id: u32, name: String, position: Vec3) -> Self {
        Self {
            id,
            name,
            position,
            yaw: 0.0,
            pitch: 0.0,
            stats: Stats::default(),
            inventory: Inventory::starter(),
            combat: CombatState::new(),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.combat.alive
    }

    /// Subtracts health and returns true if this hit killed the player
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if !self.combat.alive {
            return false;
        }
        self.stats.health -= amount;
        self.stats.clamp();
        if self.stats.health <= 0.0 {
            self.combat.alive = false;
            return true;
        }
        false
    }

    /// Brings a dead player back at `position` with fresh stats
    pub fn respawn(&mut self, position: Vec3) {
        self.position = position;
        self.stats = Stats::default();
        self.combat.alive = true;
        self.combat.in_combat_until = None;
        if let Some(weapon) = self.combat.weapon.as_mut() {
            weapon.cancel_reload();
        }
    }

    pub fn spawn_packet(&self) -> Packet {
        Packet::PlayerSpawn {
            player_id: self.id,
            name: self.name.clone(),
            position: self.position,
            yaw: self.yaw,
        }
    }

    pub fn movement_packet(&self) -> Packet {
        Packet::PlayerMovement {
            player_id: self.id,
            position: self.position,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    pub fn stats_packet(&self) -> Packet {
        Packet::StatsUpdate { stats: self.stats }
    }

    pub fn inventory_packet(&self) -> Packet {
        Packet::InventoryUpdate {
            slots: self.inventory.snapshot(),
        }
    }

    pub fn weapon_packet(&self) -> Packet {
        match &self.combat.weapon {
            Some(weapon) => weapon.state_packet(self.inventory.count(weapon.ammo_item())),
            None => Packet::WeaponStateUpdate {
                item_id: 0,
                ammo: 0,
                reserve: 0,
                reloading: false,
            },
        }
    }
}

pub struct PlayerRegistry {
    players: HashMap<u32, Player>,
    names: HashMap<String, u32>,
    next_id: u32,
    max_players: usize,
}

impl PlayerRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            names: HashMap::new(),
            next_id: 1,
            max_players,
        }
    }

    /// Registers a player, reusing the id previously given to `name`
    pub fn add(&mut self, name: &str, spawn: Vec3) -> Result<u32> {
        if self.players.len() >= self.max_players {
            return Err(ServerError::invalid_state("Server full"));
        }

        let id = match self.names.get(name) {
            Some(&id) if self.players.contains_key(&id) => {
                return Err(ServerError::invalid_state("Name already in use"));
            }
            Some(&id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.names.insert(name.to_string(), id);
                id
            }
        };

        self.players
            .insert(id, Player::new(id, name.to_string(), spawn));
        info!("Player {} ({}) joined", id, name);
        Ok(id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Player> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            info!("Player {} ({}) left", id, player.name);
        }
        removed
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn require_mut(&mut self, id: u32) -> Result<&mut Player> {
        self.players
            .get_mut(&id)
            .ok_or_else(|| ServerError::unknown_player(id))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players whose last heartbeat is older than `timeout`
    pub fn stale(&self, timeout: Duration, now: Instant) -> Vec<u32> {
        self.players
            .values()
            .filter(|p| now.saturating_duration_since(p.last_heartbeat) > timeout)
            .map(|p| p.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::items::ids;

    #[test]
    fn test_ids_are_unique_and_stable_per_name() {
        let mut registry = PlayerRegistry::new(8);
        let alice = registry.add("alice", Vec3::ZERO).unwrap();
        let bob = registry.add("bob", Vec3::ZERO).unwrap();
        assert_ne!(alice, bob);

        registry.remove(alice);
        let again = registry.add("alice", Vec3::ZERO).unwrap();
        assert_eq!(again, alice);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PlayerRegistry::new(8);
        registry.add("alice", Vec3::ZERO).unwrap();
        let err = registry.add("alice", Vec3::ZERO).unwrap_err();
        assert_eq!(err.to_string(), "invalid state: Name already in use");
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = PlayerRegistry::new(1);
        registry.add("alice", Vec3::ZERO).unwrap();
        assert!(registry.add("bob", Vec3::ZERO).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_apply_damage_kills_once() {
        let mut player = Player::new(1, "p".into(), Vec3::ZERO);
        assert!(!player.apply_damage(40.0));
        assert!(player.apply_damage(80.0));
        assert_eq!(player.stats.health, 0.0);
        assert!(!player.is_alive());
        // Already dead, further hits are not a second kill
        assert!(!player.apply_damage(10.0));
    }

    #[test]
    fn test_respawn_restores_stats() {
        let mut player = Player::new(1, "p".into(), Vec3::ZERO);
        player.apply_damage(500.0);
        player.respawn(Vec3::new(10.0, 0.0, 10.0));
        assert!(player.is_alive());
        assert_eq!(player.stats, Stats::default());
        assert_eq!(player.position, Vec3::new(10.0, 0.0, 10.0));
    }

    #[test]
    fn test_armor_value() {
        let mut combat = CombatState::new();
        assert_eq!(combat.armor_value(), 0.0);
        combat.armor_item = Some(ids::METAL_ARMOR);
        assert_eq!(combat.armor_value(), 60.0);
    }

    #[test]
    fn test_stale_players() {
        let mut registry = PlayerRegistry::new(8);
        let id = registry.add("alice", Vec3::ZERO).unwrap();
        let later = Instant::now() + Duration::from_secs(20);
        assert_eq!(registry.stale(Duration::from_secs(15), later), vec![id]);
        assert!(registry
            .stale(Duration::from_secs(15), Instant::now())
            .is_empty());
    }
}
