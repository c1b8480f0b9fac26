//! Server-side combat resolution
//!
//! Clients only *claim* hits. Every claim is checked against the authoritative
//! registry (who is alive, what is equipped, how far apart the players are)
//! before any damage is applied.
//!
//! ```text
//! final = max(1, base * hitbox_mult * type_mult * (1 - absorption))
//! absorption = clamp01(armor / 100) * max_absorption * armor_effectiveness(type)
//! ```

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::player::{Player, PlayerRegistry};
use log::{debug, info, warn};
use shared::items::{self, MeleeStats, RangedStats, UNARMED};
use shared::{AttackReport, DamageType, Hitbox, Packet, Vec3};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Lowest damage a landed hit can do
pub const MIN_DAMAGE: f32 = 1.0;

pub fn final_damage(
    base: f32,
    hitbox: Hitbox,
    damage_type: DamageType,
    armor: f32,
    max_absorption: f32,
) -> f32 {
    let absorption =
        (armor / 100.0).clamp(0.0, 1.0) * max_absorption * damage_type.armor_effectiveness();
    let damage = base * hitbox.multiplier() * damage_type.multiplier() * (1.0 - absorption);
    damage.max(MIN_DAMAGE)
}

/// Loaded state of the equipped weapon
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponState {
    pub item_id: u32,
    pub ammo: u32,
    /// Matching ammunition carried in the inventory
    pub reserve: u32,
    pub reloading: bool,
    pub reload_started: Option<Instant>,
}

impl WeaponState {
    pub fn new(item_id: u32, reserve: u32) -> Self {
        Self {
            item_id,
            ammo: 0,
            reserve,
            reloading: false,
            reload_started: None,
        }
    }

    pub fn ranged(&self) -> Option<RangedStats> {
        items::find(self.item_id).and_then(|def| def.ranged_stats())
    }

    /// Ammunition item this weapon loads, zero for melee weapons
    pub fn ammo_item(&self) -> u32 {
        self.ranged().map_or(0, |stats| stats.ammo_item)
    }

    pub fn can_reload(&self) -> bool {
        match self.ranged() {
            Some(stats) => !self.reloading && self.ammo < stats.magazine && self.reserve > 0,
            None => false,
        }
    }

    pub fn start_reload(&mut self, now: Instant) -> Result<()> {
        let stats = self
            .ranged()
            .ok_or_else(|| ServerError::invalid_state("Weapon does not use ammo"))?;
        if self.reloading {
            return Err(ServerError::invalid_state("Already reloading"));
        }
        if self.ammo >= stats.magazine {
            return Err(ServerError::invalid_state("Magazine is full"));
        }
        if self.reserve == 0 {
            return Err(ServerError::InsufficientResources("No ammo to reload".into()));
        }
        self.reloading = true;
        self.reload_started = Some(now);
        Ok(())
    }

    pub fn reload_ready(&self, now: Instant) -> bool {
        match (self.reloading, self.reload_started, self.ranged()) {
            (true, Some(started), Some(stats)) => {
                now.saturating_duration_since(started) >= Duration::from_secs_f32(stats.reload_secs)
            }
            _ => false,
        }
    }

    /// Finishes a reload and returns how many rounds moved out of reserve
    pub fn complete_reload(&mut self) -> u32 {
        let magazine = self.ranged().map_or(0, |stats| stats.magazine);
        let loaded = magazine.saturating_sub(self.ammo).min(self.reserve);
        self.ammo += loaded;
        self.reserve -= loaded;
        self.reloading = false;
        self.reload_started = None;
        loaded
    }

    pub fn cancel_reload(&mut self) {
        self.reloading = false;
        self.reload_started = None;
    }

    pub fn state_packet(&self, reserve: u32) -> Packet {
        Packet::WeaponStateUpdate {
            item_id: self.item_id,
            ammo: self.ammo,
            reserve,
            reloading: self.reloading,
        }
    }
}

/// Equips `item_id` from the player's inventory. Zero unequips.
///
/// Any reload in progress on the previous weapon is abandoned and its loaded
/// rounds go back into the inventory.
pub fn equip(player: &mut Player, item_id: u32) -> Result<()> {
    if item_id == 0 {
        unequip(player);
        return Ok(());
    }

    let def = items::find(item_id).ok_or(ServerError::UnknownEntity {
        kind: "item",
        id: item_id,
    })?;
    if !def.is_weapon() {
        return Err(ServerError::invalid_state(format!("{} is not a weapon", def.name)));
    }
    if player.inventory.count(item_id) == 0 {
        return Err(ServerError::InsufficientResources(format!(
            "{} is not in the inventory",
            def.name
        )));
    }

    unequip(player);
    let reserve = def
        .ranged_stats()
        .map_or(0, |stats| player.inventory.count(stats.ammo_item));
    player.combat.weapon = Some(WeaponState::new(item_id, reserve));
    debug!("Player {} equipped {}", player.id, def.name);
    Ok(())
}

/// Clears the weapon slot, returning loaded rounds to the inventory
pub fn unequip(player: &mut Player) {
    let Some(weapon) = player.combat.weapon.take() else {
        return;
    };
    if weapon.ammo > 0 {
        let lost = player.inventory.add(weapon.ammo_item(), weapon.ammo);
        if lost > 0 {
            warn!("Player {} lost {} rounds on unequip, inventory full", player.id, lost);
        }
    }
}

/// Value returned by the resolver for every attack claim
#[derive(Debug, Clone, PartialEq)]
pub struct AttackResult {
    pub success: bool,
    pub message: String,
    pub attacker_id: u32,
    pub victim_id: u32,
    pub weapon_item_id: u32,
    pub damage: f32,
    pub hitbox: Hitbox,
    pub distance: f32,
    pub was_killed: bool,
    pub remaining_ammo: u32,
    pub victim_health: f32,
}

impl AttackResult {
    fn rejected(attacker_id: u32, victim_id: u32, hitbox: Hitbox, message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            attacker_id,
            victim_id,
            weapon_item_id: 0,
            damage: 0.0,
            hitbox,
            distance: 0.0,
            was_killed: false,
            remaining_ammo: 0,
            victim_health: 0.0,
        }
    }

    pub fn landed(&self) -> bool {
        self.success && self.damage > 0.0
    }

    pub fn to_report(&self) -> AttackReport {
        AttackReport {
            success: self.success,
            message: self.message.clone(),
            attacker_id: self.attacker_id,
            victim_id: self.victim_id,
            damage: self.damage,
            hitbox: self.hitbox,
            distance: self.distance,
            was_killed: self.was_killed,
            remaining_ammo: self.remaining_ammo,
            victim_health: self.victim_health,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatLogEntry {
    pub at: Instant,
    /// Zero when the environment (starvation, thirst) did the killing
    pub killer_id: u32,
    pub victim_id: u32,
    pub weapon_item_id: u32,
    pub hitbox: Option<Hitbox>,
}

pub struct CombatResolver {
    max_absorption: f32,
    reach_tolerance: f32,
    combat_flag: Duration,
    log: VecDeque<CombatLogEntry>,
    log_capacity: usize,
    kills: HashMap<u32, u32>,
    deaths: HashMap<u32, u32>,
}

fn dot(a: &Vec3, b: &Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn is_zero(v: &Vec3) -> bool {
    dot(v, v) <= f32::EPSILON
}

/// Rejects swings aimed away from the target; a zero direction is not checked
fn facing(attacker: &Vec3, victim: &Vec3, direction: &Vec3) -> bool {
    let to_victim = Vec3::new(victim.x - attacker.x, victim.y - attacker.y, victim.z - attacker.z);
    if is_zero(direction) || is_zero(&to_victim) {
        return true;
    }
    dot(direction, &to_victim) >= 0.0
}

/// What the resolver needs to know about one participant
struct Snapshot {
    position: Vec3,
    alive: bool,
    armor: f32,
}

fn snapshot(player: &Player) -> Snapshot {
    Snapshot {
        position: player.position,
        alive: player.is_alive(),
        armor: player.combat.armor_value(),
    }
}

impl CombatResolver {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            max_absorption: config.max_armor_absorption,
            reach_tolerance: config.melee_reach_tolerance,
            combat_flag: config.combat_flag_duration,
            log: VecDeque::with_capacity(config.combat_log_capacity),
            log_capacity: config.combat_log_capacity,
            kills: HashMap::new(),
            deaths: HashMap::new(),
        }
    }

    /// Looks up both participants, rejecting self-hits and dead or unknown players
    fn participants(
        players: &PlayerRegistry,
        attacker_id: u32,
        victim_id: u32,
    ) -> std::result::Result<(Snapshot, Snapshot), &'static str> {
        if attacker_id == victim_id {
            return Err("Cannot attack yourself");
        }
        let attacker = players.get(attacker_id).ok_or("Unknown attacker")?;
        if !attacker.is_alive() {
            return Err("You are dead");
        }
        let victim = players.get(victim_id).ok_or("Target not found")?;
        if !victim.is_alive() {
            return Err("Target is already dead");
        }
        Ok((snapshot(attacker), snapshot(victim)))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn resolve_melee(
        &mut self,
        players: &mut PlayerRegistry,
        attacker_id: u32,
        victim_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        direction: Vec3,
        now: Instant,
    ) -> AttackResult {
        let reject = |message| AttackResult::rejected(attacker_id, victim_id, hitbox, message);

        let (attacker, victim) = match Self::participants(players, attacker_id, victim_id) {
            Ok(pair) => pair,
            Err(message) => return reject(message),
        };

        let equipped = players
            .get(attacker_id)
            .map_or(0, |p| p.combat.weapon_item());
        if weapon_item_id != equipped {
            return reject("Weapon not equipped");
        }
        let stats: MeleeStats = if weapon_item_id == 0 {
            UNARMED
        } else {
            match items::find(weapon_item_id).and_then(|def| def.melee_stats()) {
                Some(stats) => stats,
                None => return reject("Not a melee weapon"),
            }
        };

        let distance = attacker.position.distance(&victim.position);
        // NaN counts as out of reach
        if distance.is_nan() || distance > stats.reach + self.reach_tolerance {
            return AttackResult {
                distance,
                ..reject("Target out of reach")
            };
        }
        if !facing(&attacker.position, &victim.position, &direction) {
            return reject("Not facing target");
        }

        let damage = final_damage(
            stats.damage,
            hitbox,
            stats.damage_type,
            victim.armor,
            self.max_absorption,
        );
        let mut result = self.land_hit(players, attacker_id, victim_id, weapon_item_id, hitbox, damage, now);
        result.distance = distance;
        result
    }

    #[allow(clippy::too_many_arguments)]
    pub fn resolve_ranged(
        &mut self,
        players: &mut PlayerRegistry,
        attacker_id: u32,
        victim_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        reported_distance: f32,
        now: Instant,
    ) -> AttackResult {
        let reject = |message| AttackResult::rejected(attacker_id, victim_id, hitbox, message);

        if attacker_id == victim_id {
            return reject("Cannot attack yourself");
        }
        let Some(attacker) = players.get(attacker_id) else {
            return reject("Unknown attacker");
        };
        if !attacker.is_alive() {
            return reject("You are dead");
        }
        let attacker_position = attacker.position;

        let Some(weapon) = attacker.combat.weapon.as_ref() else {
            return reject("Weapon not equipped");
        };
        if weapon.item_id != weapon_item_id {
            return reject("Weapon not equipped");
        }
        let Some(stats) = weapon.ranged() else {
            return reject("Not a ranged weapon");
        };
        if weapon.reloading {
            return reject("Cannot fire while reloading");
        }
        if weapon.ammo == 0 {
            return reject("Out of ammo");
        }

        // A claimed hit on a dead or unknown player is refused outright
        let victim = if victim_id == 0 {
            None
        } else {
            match players.get(victim_id) {
                Some(victim) if victim.is_alive() => Some(snapshot(victim)),
                Some(_) => return reject("Target is already dead"),
                None => return reject("Target not found"),
            }
        };

        let remaining_ammo = match players
            .get_mut(attacker_id)
            .and_then(|p| p.combat.weapon.as_mut())
        {
            Some(weapon) => {
                weapon.ammo -= 1;
                weapon.ammo
            }
            None => 0,
        };

        let miss = |message: &str, distance: f32| AttackResult {
            success: true,
            message: message.to_string(),
            weapon_item_id,
            distance,
            remaining_ammo,
            ..AttackResult::rejected(attacker_id, victim_id, hitbox, "")
        };

        let Some(victim) = victim else {
            return miss("Missed", 0.0);
        };

        let distance = attacker_position.distance(&victim.position);
        if (distance - reported_distance).abs() > 5.0 {
            debug!(
                "Player {} reported distance {:.1}, server measured {:.1}",
                attacker_id, reported_distance, distance
            );
        }
        if distance.is_nan() || distance > stats.max_range {
            return miss("Target out of range", distance);
        }

        let damage = final_damage(
            stats.damage,
            hitbox,
            stats.damage_type,
            victim.armor,
            self.max_absorption,
        );
        let mut result = self.land_hit(players, attacker_id, victim_id, weapon_item_id, hitbox, damage, now);
        result.distance = distance;
        result.remaining_ammo = remaining_ammo;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn land_hit(
        &mut self,
        players: &mut PlayerRegistry,
        attacker_id: u32,
        victim_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        damage: f32,
        now: Instant,
    ) -> AttackResult {
        let flag_until = now + self.combat_flag;

        let (was_killed, victim_health) = match players.get_mut(victim_id) {
            Some(victim) => {
                let killed = victim.apply_damage(damage);
                victim.combat.in_combat_until = Some(flag_until);
                (killed, victim.stats.health)
            }
            None => (false, 0.0),
        };
        if let Some(attacker) = players.get_mut(attacker_id) {
            attacker.combat.in_combat_until = Some(flag_until);
        }

        if was_killed {
            self.register_kill(players, attacker_id, victim_id, weapon_item_id, Some(hitbox), now);
        }

        AttackResult {
            success: true,
            message: if was_killed { "Killed".into() } else { "Hit".into() },
            attacker_id,
            victim_id,
            weapon_item_id,
            damage,
            hitbox,
            distance: 0.0,
            was_killed,
            remaining_ammo: 0,
            victim_health,
        }
    }

    /// Records a kill. A `killer_id` of zero means the environment.
    pub fn register_kill(
        &mut self,
        players: &mut PlayerRegistry,
        killer_id: u32,
        victim_id: u32,
        weapon_item_id: u32,
        hitbox: Option<Hitbox>,
        now: Instant,
    ) {
        if killer_id != 0 {
            *self.kills.entry(killer_id).or_insert(0) += 1;
            if let Some(killer) = players.get_mut(killer_id) {
                killer.combat.kills += 1;
            }
        }
        self.register_death(players, victim_id);

        if self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(CombatLogEntry {
            at: now,
            killer_id,
            victim_id,
            weapon_item_id,
            hitbox,
        });
        info!("Player {} killed by {}", victim_id, killer_id);
    }

    pub fn register_death(&mut self, players: &mut PlayerRegistry, victim_id: u32) {
        *self.deaths.entry(victim_id).or_insert(0) += 1;
        if let Some(victim) = players.get_mut(victim_id) {
            victim.combat.deaths += 1;
            if let Some(weapon) = victim.combat.weapon.as_mut() {
                weapon.cancel_reload();
            }
        }
    }

    /// Up to `n` most recent entries, newest first
    pub fn recent_log(&self, n: usize) -> Vec<CombatLogEntry> {
        self.log.iter().rev().take(n).cloned().collect()
    }

    pub fn kills_of(&self, player_id: u32) -> u32 {
        self.kills.get(&player_id).copied().unwrap_or(0)
    }

    pub fn deaths_of(&self, player_id: u32) -> u32 {
        self.deaths.get(&player_id).copied().unwrap_or(0)
    }
}

/// Finishes due reloads and expires combat flags.
/// Returns the players whose weapon state changed.
pub fn upkeep(players: &mut PlayerRegistry, now: Instant) -> Vec<u32> {
    let mut reloaded = Vec::new();
    for player in players.iter_mut() {
        if !player.combat.in_combat(now) {
            player.combat.in_combat_until = None;
        }

        let Some(weapon) = player.combat.weapon.as_mut() else {
            continue;
        };
        if !weapon.reload_ready(now) {
            continue;
        }

        // Ammo may have moved while reloading, so trust the inventory
        let ammo_item = weapon.ammo_item();
        weapon.reserve = player.inventory.count(ammo_item);
        let loaded = weapon.complete_reload();
        player.inventory.remove(ammo_item, loaded);
        reloaded.push(player.id);
    }
    reloaded
}
