//! Gameplay packet handlers for active sessions

use crate::combat::{self, AttackResult};
use crate::error::{Result, ServerError};
use crate::player::Player;
use crate::session::Session;
use log::{debug, warn};
use shared::items::{self, ids, ItemKind, HAND_GATHER_DAMAGE};
use shared::{Hitbox, Packet, ToolType, Vec3, WORLD_SIZE};
use std::time::Instant;

impl Session {
    pub(crate) async fn handle_gameplay(&mut self, packet: Packet) -> Result<()> {
        let player_id = self.require_player()?;
        match packet {
            Packet::PlayerMovement {
                player_id: claimed,
                position,
                yaw,
                pitch,
            } => self.on_movement(player_id, claimed, position, yaw, pitch).await,
            Packet::ItemUse { slot } => self.on_item_use(player_id, slot as usize).await,
            Packet::ItemMove { from, to } => {
                self.on_item_move(player_id, from as usize, to as usize).await
            }
            Packet::ResourceHit {
                node_id,
                tool_item_id,
            } => self.on_resource_hit(player_id, node_id, tool_item_id).await,
            Packet::CraftRequest { recipe_id, amount } => {
                self.on_craft_request(player_id, recipe_id, amount).await
            }
            Packet::CraftCancel { queue_index } => {
                self.on_craft_cancel(player_id, queue_index as usize).await
            }
            Packet::MeleeAttack {
                target_id,
                weapon_item_id,
                hitbox,
                direction,
            } => {
                self.on_melee(player_id, target_id, weapon_item_id, hitbox, direction)
                    .await
            }
            Packet::RangedAttack {
                target_id,
                weapon_item_id,
                hitbox,
                distance,
                ..
            } => {
                self.on_ranged(player_id, target_id, weapon_item_id, hitbox, distance)
                    .await
            }
            Packet::WeaponEquip { item_id } => self.on_weapon_equip(player_id, item_id).await,
            Packet::WeaponReload => self.on_weapon_reload(player_id).await,
            Packet::RespawnRequest => self.on_respawn(player_id).await,
            other => Err(ServerError::invalid_state(format!(
                "unexpected {:?} from client",
                other.packet_type()
            ))),
        }
    }

    fn reply(&self, packet: Packet) {
        self.ctx.send_to_addr(self.addr, packet);
    }

    fn refuse_dead(player: &Player, action: &str) -> Result<()> {
        if player.is_alive() {
            Ok(())
        } else {
            Err(ServerError::invalid_state(format!("dead players cannot {}", action)))
        }
    }

    async fn on_movement(
        &mut self,
        player_id: u32,
        claimed: u32,
        position: Vec3,
        yaw: f32,
        pitch: f32,
    ) -> Result<()> {
        if claimed != player_id {
            return Err(ServerError::invalid_state(format!(
                "player {} tried to move player {}",
                player_id, claimed
            )));
        }
        if !position.is_finite() || !yaw.is_finite() || !pitch.is_finite() {
            return Err(ServerError::invalid_state(format!(
                "player {} sent a non-finite transform",
                player_id
            )));
        }
        let position = Vec3::new(
            position.x.clamp(0.0, WORLD_SIZE),
            position.y,
            position.z.clamp(0.0, WORLD_SIZE),
        );

        let movement = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            if !player.is_alive() {
                debug!("Ignoring movement from dead player {}", player_id);
                return Ok(());
            }
            player.position = position;
            player.yaw = yaw;
            player.pitch = pitch;
            player.movement_packet()
        };
        self.ctx.broadcast(movement, Some(player_id)).await;
        Ok(())
    }

    async fn on_item_use(&mut self, player_id: u32, slot: usize) -> Result<()> {
        let (inventory, stats, weapon) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            Self::refuse_dead(player, "use items")?;
            let stack = *player
                .inventory
                .slot(slot)
                .ok_or_else(|| ServerError::invalid_state(format!("slot {} is empty", slot)))?;
            let def = items::find(stack.item_id).ok_or(ServerError::UnknownEntity {
                kind: "item",
                id: stack.item_id,
            })?;

            let mut weapon = None;
            match def.kind {
                ItemKind::Consumable {
                    health,
                    hunger,
                    thirst,
                } => {
                    player.inventory.take_from_slot(slot, 1);
                    player.stats.health += health;
                    player.stats.hunger += hunger;
                    player.stats.thirst += thirst;
                    player.stats.clamp();
                }
                ItemKind::Armor { .. } => {
                    player.inventory.take_from_slot(slot, 1);
                    if let Some(old) = player.combat.armor_item.replace(stack.item_id) {
                        if player.inventory.add(old, 1) > 0 {
                            warn!("Player {} dropped armour {}, inventory full", player_id, old);
                        }
                    }
                }
                _ if def.is_weapon() => {
                    combat::equip(player, stack.item_id)?;
                    weapon = Some(player.weapon_packet());
                }
                _ => {
                    return Err(ServerError::invalid_state(format!(
                        "{} cannot be used",
                        def.name
                    )))
                }
            }
            (player.inventory_packet(), player.stats_packet(), weapon)
        };

        self.reply(inventory);
        self.reply(stats);
        if let Some(weapon) = weapon {
            self.reply(weapon);
        }
        Ok(())
    }

    async fn on_item_move(&mut self, player_id: u32, from: usize, to: usize) -> Result<()> {
        let (moved, inventory) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            Self::refuse_dead(player, "move items")?;
            let moved = player.inventory.move_slot(from, to);
            (moved, player.inventory_packet())
        };
        // Always resync so a refused move snaps back on the client
        self.reply(inventory);
        moved
    }

    async fn on_resource_hit(&mut self, player_id: u32, node_id: u32, tool_item_id: u32) -> Result<()> {
        let (result, inventory) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            Self::refuse_dead(player, "gather")?;

            let (tool, damage) = if tool_item_id == 0 {
                (ToolType::Hand, HAND_GATHER_DAMAGE)
            } else {
                if player.inventory.count(tool_item_id) == 0 {
                    return Err(ServerError::InsufficientResources(format!(
                        "tool {} not carried",
                        tool_item_id
                    )));
                }
                match items::find(tool_item_id).map(|def| def.kind) {
                    Some(ItemKind::Tool {
                        tool, gather_damage, ..
                    }) => (tool, gather_damage),
                    _ => {
                        return Err(ServerError::invalid_state(format!(
                            "item {} is not a gathering tool",
                            tool_item_id
                        )))
                    }
                }
            };

            let mut resources = self.ctx.resources.write().await;
            let node = resources.get(node_id).ok_or(ServerError::UnknownEntity {
                kind: "resource node",
                id: node_id,
            })?;
            let distance = node.position.distance(&player.position);
            if distance.is_nan() || distance > self.ctx.config.gather_reach {
                return Err(ServerError::invalid_state(format!(
                    "node {} is {:.1} away",
                    node_id, distance
                )));
            }

            let result = resources
                .gather(node_id, damage, tool, player_id)
                .ok_or_else(|| ServerError::invalid_state(format!("node {} is depleted", node_id)))?;

            for (item_id, quantity) in [
                (ids::WOOD, result.wood),
                (ids::STONE, result.stone),
                (ids::METAL_ORE, result.metal_ore),
                (ids::SULFUR_ORE, result.sulfur_ore),
            ] {
                if quantity > 0 && player.inventory.add(item_id, quantity) > 0 {
                    debug!("Player {} inventory full while gathering", player_id);
                }
            }
            (result, player.inventory_packet())
        };

        self.reply(result.to_packet());
        self.reply(inventory);
        let update = if result.was_destroyed {
            Packet::ResourceDestroyed { node_id }
        } else {
            Packet::ResourceUpdate {
                node_id,
                health: result.remaining_health,
            }
        };
        self.ctx.broadcast(update, None).await;
        Ok(())
    }

    async fn on_craft_request(&mut self, player_id: u32, recipe_id: u32, amount: u32) -> Result<()> {
        let outcome = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            if player.is_alive() {
                let mut crafting = self.ctx.crafting.lock().await;
                let result = crafting.start(player_id, recipe_id, amount, &mut player.inventory);
                Some((result, player.inventory_packet(), crafting.queue_packet(player_id)))
            } else {
                None
            }
        };
        let Some((result, inventory, queue)) = outcome else {
            self.reply(Packet::CraftStarted {
                success: false,
                message: "Dead players cannot craft".to_string(),
                recipe_id,
                duration: 0.0,
            });
            return Err(ServerError::invalid_state("dead players cannot craft"));
        };

        self.reply(result.to_packet(recipe_id));
        if result.success {
            self.reply(inventory);
            self.reply(queue);
        }
        Ok(())
    }

    async fn on_craft_cancel(&mut self, player_id: u32, index: usize) -> Result<()> {
        let (cancelled, inventory, queue) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            Self::refuse_dead(player, "cancel crafts")?;
            let mut crafting = self.ctx.crafting.lock().await;
            let cancelled = crafting.cancel(player_id, index, &mut player.inventory);
            (cancelled, player.inventory_packet(), crafting.queue_packet(player_id))
        };

        self.reply(queue);
        if !cancelled {
            return Err(ServerError::invalid_state(format!(
                "no crafting job at index {}",
                index
            )));
        }
        self.reply(inventory);
        Ok(())
    }

    async fn on_melee(
        &mut self,
        player_id: u32,
        target_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        direction: Vec3,
    ) -> Result<()> {
        let result = {
            let mut players = self.ctx.players.write().await;
            let mut combat = self.ctx.combat.lock().await;
            combat.resolve_melee(
                &mut players,
                player_id,
                target_id,
                weapon_item_id,
                hitbox,
                direction,
                Instant::now(),
            )
        };
        self.publish_attack(result, None).await;
        Ok(())
    }

    async fn on_ranged(
        &mut self,
        player_id: u32,
        target_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        distance: f32,
    ) -> Result<()> {
        let (result, weapon) = {
            let mut players = self.ctx.players.write().await;
            let mut combat = self.ctx.combat.lock().await;
            let result = combat.resolve_ranged(
                &mut players,
                player_id,
                target_id,
                weapon_item_id,
                hitbox,
                distance,
                Instant::now(),
            );
            let weapon = players.get(player_id).map(|p| p.weapon_packet());
            (result, weapon)
        };
        self.publish_attack(result, weapon).await;
        Ok(())
    }

    /// Tells the attacker, the victim and (on a kill) everyone what happened
    async fn publish_attack(&self, result: AttackResult, weapon: Option<Packet>) {
        self.reply(Packet::AttackResult(result.to_report()));
        if let Some(weapon) = weapon {
            self.reply(weapon);
        }
        if !result.landed() {
            return;
        }

        self.ctx
            .send_to_player(
                result.victim_id,
                Packet::TakeDamageNotify {
                    attacker_id: result.attacker_id,
                    damage: result.damage,
                    hitbox: result.hitbox,
                    health: result.victim_health,
                },
            )
            .await;

        if result.was_killed {
            self.ctx
                .broadcast(
                    Packet::PlayerKilled {
                        victim_id: result.victim_id,
                        killer_id: result.attacker_id,
                        weapon_item_id: result.weapon_item_id,
                        hitbox: result.hitbox,
                    },
                    None,
                )
                .await;
        }
    }

    async fn on_weapon_equip(&mut self, player_id: u32, item_id: u32) -> Result<()> {
        let (equipped, weapon, inventory) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            Self::refuse_dead(player, "equip weapons")?;
            let equipped = combat::equip(player, item_id);
            (equipped, player.weapon_packet(), player.inventory_packet())
        };
        self.reply(weapon);
        self.reply(inventory);
        equipped
    }

    async fn on_weapon_reload(&mut self, player_id: u32) -> Result<()> {
        let (started, weapon) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            let started = match player.combat.weapon.as_mut() {
                Some(weapon) => {
                    weapon.reserve = player.inventory.count(weapon.ammo_item());
                    weapon.start_reload(Instant::now())
                }
                None => Err(ServerError::invalid_state("No weapon equipped")),
            };
            (started, player.weapon_packet())
        };
        self.reply(weapon);
        started
    }

    async fn on_respawn(&mut self, player_id: u32) -> Result<()> {
        let (response, spawn) = {
            let mut players = self.ctx.players.write().await;
            let player = players.require_mut(player_id)?;
            if player.is_alive() {
                (
                    Packet::RespawnResponse {
                        success: false,
                        position: player.position,
                        health: player.stats.health,
                    },
                    None,
                )
            } else {
                player.respawn(self.ctx.spawn_point());
                (
                    Packet::RespawnResponse {
                        success: true,
                        position: player.position,
                        health: player.stats.health,
                    },
                    Some((player.spawn_packet(), player.stats_packet())),
                )
            }
        };

        self.reply(response);
        if let Some((spawn, stats)) = spawn {
            self.reply(stats);
            self.ctx.broadcast(spawn, Some(player_id)).await;
        }
        Ok(())
    }
}
