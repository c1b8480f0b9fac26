//! Periodic work run against the shared context
//!
//! Each function is one pass of a tick loop. They all follow the same shape:
//! take the locks they need, collect what has to be sent, drop the guards,
//! then send.

use crate::combat;
use crate::context::ServerContext;
use crate::error::ServerError;
use log::{debug, info, warn};
use shared::types::AMBIENT_TEMPERATURE;
use shared::{Hitbox, Packet};
use std::time::Instant;

/// Drains hunger and thirst, applies starvation and moves temperature toward
/// ambient. Returns the players who died this pass.
pub async fn decay_stats(ctx: &ServerContext, dt: f32) -> Vec<u32> {
    let config = &ctx.config;
    let now = Instant::now();

    let deaths = {
        let mut players = ctx.players.write().await;
        let mut deaths = Vec::new();

        for player in players.iter_mut() {
            if !player.is_alive() {
                continue;
            }

            let stats = &mut player.stats;
            stats.hunger -= config.hunger_decay_per_sec * dt;
            stats.thirst -= config.thirst_decay_per_sec * dt;
            stats.clamp();

            let drift = config.temperature_drift_per_sec * dt;
            let gap = AMBIENT_TEMPERATURE - stats.temperature;
            stats.temperature += gap.clamp(-drift, drift);

            let mut starvation = 0.0;
            if stats.hunger <= 0.0 {
                starvation += config.starvation_damage_per_sec * dt;
            }
            if stats.thirst <= 0.0 {
                starvation += config.starvation_damage_per_sec * dt;
            }
            if starvation > 0.0 && player.apply_damage(starvation) {
                deaths.push(player.id);
            }
        }

        if !deaths.is_empty() {
            let mut combat = ctx.combat.lock().await;
            for &victim_id in &deaths {
                combat.register_kill(&mut players, 0, victim_id, 0, None, now);
            }
        }
        deaths
    };

    for &victim_id in &deaths {
        info!("Player {} died of exposure", victim_id);
        ctx.broadcast(
            Packet::PlayerKilled {
                victim_id,
                killer_id: 0,
                weapon_item_id: 0,
                hitbox: Hitbox::Chest,
            },
            None,
        )
        .await;
    }
    deaths
}

/// Sends every player their current stats
pub async fn sync_stats(ctx: &ServerContext) {
    let updates: Vec<(u32, Packet)> = {
        let players = ctx.players.read().await;
        players.iter().map(|p| (p.id, p.stats_packet())).collect()
    };
    for (player_id, packet) in updates {
        ctx.send_to_player(player_id, packet).await;
    }
}

pub async fn regen_resources(ctx: &ServerContext, now: Instant) -> usize {
    let revived = ctx.resources.write().await.tick_at(now);
    for node in &revived {
        ctx.broadcast(
            Packet::ResourceRespawn {
                node_id: node.id,
                health: node.health,
            },
            None,
        )
        .await;
    }
    revived.len()
}

/// Advances crafting by `elapsed` seconds and hands out finished items
pub async fn progress_crafting(ctx: &ServerContext, elapsed: f32) {
    let completed = ctx.crafting.lock().await.tick(elapsed);
    if completed.is_empty() {
        return;
    }

    let mut owners: Vec<u32> = completed.iter().map(|job| job.player_id).collect();
    owners.sort_unstable();
    owners.dedup();

    let inventories: Vec<(u32, Packet)> = {
        let mut players = ctx.players.write().await;
        for job in &completed {
            let Some(player) = players.get_mut(job.player_id) else {
                continue;
            };
            let lost = player.inventory.add(job.item_id, job.quantity);
            if lost > 0 {
                warn!(
                    "Player {} lost {} of crafted item {}, inventory full",
                    job.player_id, lost, job.item_id
                );
            }
        }
        owners
            .iter()
            .filter_map(|&id| players.get(id).map(|p| (id, p.inventory_packet())))
            .collect()
    };

    let queues: Vec<(u32, Packet)> = {
        let crafting = ctx.crafting.lock().await;
        owners
            .iter()
            .map(|&id| (id, crafting.queue_packet(id)))
            .collect()
    };

    for job in &completed {
        debug!("Player {} crafted {}x{}", job.player_id, job.quantity, job.item_id);
        ctx.send_to_player(
            job.player_id,
            Packet::CraftComplete {
                recipe_id: job.recipe_id,
                item_id: job.item_id,
                quantity: job.quantity,
            },
        )
        .await;
    }
    for (player_id, packet) in inventories.into_iter().chain(queues) {
        ctx.send_to_player(player_id, packet).await;
    }
}

/// Completes due reloads and clears expired combat flags
pub async fn combat_upkeep(ctx: &ServerContext, now: Instant) {
    let updates: Vec<(u32, Packet, Packet)> = {
        let mut players = ctx.players.write().await;
        let reloaded = combat::upkeep(&mut players, now);
        reloaded
            .iter()
            .filter_map(|&id| {
                players
                    .get(id)
                    .map(|p| (id, p.weapon_packet(), p.inventory_packet()))
            })
            .collect()
    };
    for (player_id, weapon, inventory) in updates {
        ctx.send_to_player(player_id, weapon).await;
        ctx.send_to_player(player_id, inventory).await;
    }
}

/// Disconnects players whose heartbeat has gone quiet
pub async fn sweep_liveness(ctx: &ServerContext, now: Instant) -> Vec<u32> {
    let stale = {
        let players = ctx.players.read().await;
        players.stale(ctx.config.heartbeat_timeout, now)
    };
    for &player_id in &stale {
        warn!(
            "{}",
            ServerError::heartbeat_timeout(player_id, ctx.config.heartbeat_timeout)
        );
        ctx.disconnect_player(player_id, "Timed out").await;
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::transport::TransportCommand;
    use assert_approx_eq::assert_approx_eq;
    use shared::items::ids;
    use shared::{ResourceType, Vec3};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn join(ctx: &ServerContext, port: u16, name: &str) -> u32 {
        let id = ctx.players.write().await.add(name, Vec3::ZERO).unwrap();
        ctx.crafting.lock().await.add_player(id);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sessions = ctx.sessions.write().await;
        sessions.insert(addr, tx);
        sessions.bind(addr, id);
        sessions.activate(addr);
        id
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<TransportCommand>) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Ok(command) = rx.try_recv() {
            match command {
                TransportCommand::Send { packet, .. } | TransportCommand::Broadcast { packet, .. } => {
                    out.push(packet)
                }
                TransportCommand::Drop { .. } => {}
            }
        }
        out
    }

    #[tokio::test]
    async fn test_decay_drains_and_drifts() {
        let (ctx, _rx) = test_context();
        let id = join(&ctx, 6000, "alice").await;
        ctx.players.write().await.get_mut(id).unwrap().stats.temperature = 30.0;

        assert!(decay_stats(&ctx, 10.0).await.is_empty());

        let players = ctx.players.read().await;
        let stats = players.get(id).unwrap().stats;
        assert_approx_eq!(stats.hunger, 99.0, 0.001);
        assert_approx_eq!(stats.thirst, 98.5, 0.001);
        assert_approx_eq!(stats.temperature, 29.5, 0.001);
        assert_eq!(stats.health, 100.0);
    }

    #[tokio::test]
    async fn test_starvation_kills_and_is_broadcast() {
        let (ctx, mut rx) = test_context();
        let id = join(&ctx, 6001, "bob").await;
        {
            let mut players = ctx.players.write().await;
            let stats = &mut players.get_mut(id).unwrap().stats;
            stats.hunger = 0.0;
            stats.thirst = 0.0;
            stats.health = 1.5;
        }

        assert_eq!(decay_stats(&ctx, 1.0).await, vec![id]);
        assert!(!ctx.players.read().await.get(id).unwrap().is_alive());
        assert_eq!(ctx.combat.lock().await.deaths_of(id), 1);
        assert!(matches!(
            sent(&mut rx).as_slice(),
            [Packet::PlayerKilled { killer_id: 0, hitbox: Hitbox::Chest, .. }]
        ));

        // Already dead, nothing further happens
        assert!(decay_stats(&ctx, 1.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_crafting_delivers_items() {
        let (ctx, mut rx) = test_context();
        let id = join(&ctx, 6002, "carol").await;
        {
            let mut players = ctx.players.write().await;
            let player = players.get_mut(id).unwrap();
            player.inventory.add(ids::WOOD, 25);
            player.inventory.add(ids::STONE, 10);
            let mut crafting = ctx.crafting.lock().await;
            assert!(crafting.start(id, 5, 1, &mut player.inventory).success);
        }

        progress_crafting(&ctx, 2.0).await;
        assert!(sent(&mut rx).is_empty());

        progress_crafting(&ctx, 3.5).await;
        assert_eq!(ctx.players.read().await.get(id).unwrap().inventory.count(ids::WOODEN_ARROW), 2);
        let packets = sent(&mut rx);
        assert!(matches!(packets[0], Packet::CraftComplete { quantity: 2, .. }));
        assert!(matches!(packets[1], Packet::InventoryUpdate { .. }));
        assert!(matches!(&packets[2], Packet::CraftQueueUpdate { entries } if entries.is_empty()));
    }

    #[tokio::test]
    async fn test_regen_broadcasts_respawn() {
        let (ctx, mut rx) = test_context();
        join(&ctx, 6003, "dave").await;
        let node = {
            let mut resources = ctx.resources.write().await;
            let node = resources.spawn(ResourceType::Tree, Vec3::ZERO);
            resources.gather(node, 100.0, shared::ToolType::Rock, 1).unwrap();
            node
        };

        assert_eq!(regen_resources(&ctx, Instant::now()).await, 0);
        let later = Instant::now() + ctx.config.resource_respawn_delay + Duration::from_secs(1);
        assert_eq!(regen_resources(&ctx, later).await, 1);
        assert!(matches!(
            sent(&mut rx).as_slice(),
            [Packet::ResourceRespawn { node_id, health }] if *node_id == node && *health == 50.0
        ));
    }

    #[tokio::test]
    async fn test_upkeep_finishes_reload() {
        let (ctx, mut rx) = test_context();
        let id = join(&ctx, 6004, "erin").await;
        let now = Instant::now();
        {
            let mut players = ctx.players.write().await;
            let player = players.get_mut(id).unwrap();
            player.inventory.add(ids::HUNTING_BOW, 1);
            player.inventory.add(ids::WOODEN_ARROW, 5);
            combat::equip(player, ids::HUNTING_BOW).unwrap();
            player.combat.weapon.as_mut().unwrap().start_reload(now).unwrap();
        }

        combat_upkeep(&ctx, now).await;
        assert!(sent(&mut rx).is_empty());

        combat_upkeep(&ctx, now + Duration::from_secs(2)).await;
        assert_eq!(ctx.players.read().await.get(id).unwrap().inventory.count(ids::WOODEN_ARROW), 4);
        assert!(matches!(
            sent(&mut rx)[0],
            Packet::WeaponStateUpdate { ammo: 1, reserve: 4, reloading: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_liveness_sweep_disconnects_stale() {
        let (ctx, _rx) = test_context();
        let id = join(&ctx, 6005, "frank").await;

        assert!(sweep_liveness(&ctx, Instant::now()).await.is_empty());
        let later = Instant::now() + ctx.config.heartbeat_timeout + Duration::from_secs(1);
        assert_eq!(sweep_liveness(&ctx, later).await, vec![id]);
        assert!(ctx.players.read().await.is_empty());
        assert!(ctx.sessions.read().await.is_empty());
    }
}
