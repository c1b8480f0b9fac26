//! Server tunables
//!
//! Every interval, cap and rate the server uses lives in [`ServerConfig`].
//! The binary fills it from command-line flags; tests build it directly and
//! shorten whatever they need.

use clap::ValueEnum;
use shared::Vec3;
use std::time::Duration;

const DEFAULT_MAX_PLAYERS: usize = 64;
const DEFAULT_POLL_INTERVAL_MS: u64 = 15;
const DEFAULT_STATS_DECAY_INTERVAL_MS: u64 = 1_000;
const DEFAULT_STATS_SYNC_INTERVAL_MS: u64 = 2_000;
const DEFAULT_RESOURCE_REGEN_INTERVAL_MS: u64 = 10_000;
const DEFAULT_CRAFTING_INTERVAL_MS: u64 = 500;
const DEFAULT_COMBAT_INTERVAL_MS: u64 = 100;
const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SYNC_STEP_DELAY_MS: u64 = 50;
const DEFAULT_RESEND_TIMEOUT_MS: u64 = 200;
const DEFAULT_MAX_RESEND_ATTEMPTS: u32 = 10;
const DEFAULT_PEER_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RESPAWN_DELAY_SECS: u64 = 120;
const DEFAULT_NODES_PER_TYPE: usize = 25;
const DEFAULT_CRAFTING_QUEUE_CAP: usize = 5;
const DEFAULT_MAX_CRAFT_AMOUNT: u32 = 100;
const DEFAULT_COMBAT_LOG_CAPACITY: usize = 100;

/// What a cancelled crafting job gives back
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RefundPolicy {
    /// Every cancelled unit is refunded in full
    Full,
    /// The unit in progress refunds the fraction of time still remaining
    Proportional,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_players: usize,

    // Loop cadences
    pub poll_interval: Duration,
    pub stats_decay_interval: Duration,
    pub stats_sync_interval: Duration,
    pub resource_regen_interval: Duration,
    pub crafting_interval: Duration,
    pub combat_interval: Duration,
    pub liveness_interval: Duration,

    // Connection handling
    pub heartbeat_timeout: Duration,
    pub sync_step_delay: Duration,
    pub resend_timeout: Duration,
    pub max_resend_attempts: u32,
    pub peer_idle_timeout: Duration,

    // Survival
    pub hunger_decay_per_sec: f32,
    pub thirst_decay_per_sec: f32,
    pub starvation_damage_per_sec: f32,
    pub temperature_drift_per_sec: f32,
    pub spawn_point: Vec3,
    pub spawn_radius: f32,

    // World
    pub world_seed: Option<u64>,
    pub nodes_per_type: usize,
    pub resource_respawn_delay: Duration,
    pub gather_reach: f32,

    // Crafting
    pub crafting_queue_cap: usize,
    /// Largest unit count a single craft request may ask for
    pub max_craft_amount: u32,
    pub refund_policy: RefundPolicy,

    // Combat
    pub max_armor_absorption: f32,
    pub melee_reach_tolerance: f32,
    pub combat_flag_duration: Duration,
    pub combat_log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", shared::DEFAULT_PORT),
            max_players: DEFAULT_MAX_PLAYERS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stats_decay_interval: Duration::from_millis(DEFAULT_STATS_DECAY_INTERVAL_MS),
            stats_sync_interval: Duration::from_millis(DEFAULT_STATS_SYNC_INTERVAL_MS),
            resource_regen_interval: Duration::from_millis(DEFAULT_RESOURCE_REGEN_INTERVAL_MS),
            crafting_interval: Duration::from_millis(DEFAULT_CRAFTING_INTERVAL_MS),
            combat_interval: Duration::from_millis(DEFAULT_COMBAT_INTERVAL_MS),
            liveness_interval: Duration::from_millis(DEFAULT_LIVENESS_INTERVAL_MS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            sync_step_delay: Duration::from_millis(DEFAULT_SYNC_STEP_DELAY_MS),
            resend_timeout: Duration::from_millis(DEFAULT_RESEND_TIMEOUT_MS),
            max_resend_attempts: DEFAULT_MAX_RESEND_ATTEMPTS,
            peer_idle_timeout: Duration::from_secs(DEFAULT_PEER_IDLE_TIMEOUT_SECS),
            hunger_decay_per_sec: 0.1,
            thirst_decay_per_sec: 0.15,
            starvation_damage_per_sec: 1.0,
            temperature_drift_per_sec: 0.05,
            spawn_point: Vec3::new(shared::WORLD_SIZE / 2.0, 0.0, shared::WORLD_SIZE / 2.0),
            spawn_radius: 20.0,
            world_seed: None,
            nodes_per_type: DEFAULT_NODES_PER_TYPE,
            resource_respawn_delay: Duration::from_secs(DEFAULT_RESPAWN_DELAY_SECS),
            gather_reach: 5.0,
            crafting_queue_cap: DEFAULT_CRAFTING_QUEUE_CAP,
            max_craft_amount: DEFAULT_MAX_CRAFT_AMOUNT,
            refund_policy: RefundPolicy::Proportional,
            max_armor_absorption: 0.8,
            melee_reach_tolerance: 1.0,
            combat_flag_duration: Duration::from_secs(10),
            combat_log_capacity: DEFAULT_COMBAT_LOG_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadences() {
        let config = ServerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(15));
        assert_eq!(config.stats_decay_interval, Duration::from_secs(1));
        assert_eq!(config.stats_sync_interval, Duration::from_secs(2));
        assert_eq!(config.resource_regen_interval, Duration::from_secs(10));
        assert_eq!(config.crafting_interval, Duration::from_millis(500));
        assert_eq!(config.combat_interval, Duration::from_millis(100));
        assert_eq!(config.liveness_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_default_policies() {
        let config = ServerConfig::default();
        assert_eq!(config.crafting_queue_cap, 5);
        assert_eq!(config.max_craft_amount, 100);
        assert_eq!(config.refund_policy, RefundPolicy::Proportional);
        assert!(config.max_armor_absorption < 1.0);
        assert!(config.bind_addr.ends_with(&shared::DEFAULT_PORT.to_string()));
    }
}
