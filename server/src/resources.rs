//! Gatherable world nodes
//!
//! Hitting a node removes health and yields materials in proportion to the
//! damage actually dealt. A node at zero health is destroyed and comes back at
//! full health once its respawn delay has passed.

use crate::config::ServerConfig;
use log::{debug, info};
use rand::Rng;
use shared::{NodeData, Packet, ResourceType, ToolType, Vec3, WORLD_SIZE};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub fn max_health(resource_type: ResourceType) -> f32 {
    match resource_type {
        ResourceType::Tree => 50.0,
        ResourceType::Stone => 100.0,
        ResourceType::MetalOre | ResourceType::SulfurOre => 120.0,
    }
}

/// Materials produced per point of damage, before the tool modifier
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct YieldRates {
    wood: f32,
    stone: f32,
    metal_ore: f32,
    sulfur_ore: f32,
}

fn yield_rates(resource_type: ResourceType) -> YieldRates {
    match resource_type {
        ResourceType::Tree => YieldRates {
            wood: 2.0,
            ..Default::default()
        },
        ResourceType::Stone => YieldRates {
            stone: 1.0,
            ..Default::default()
        },
        ResourceType::MetalOre => YieldRates {
            metal_ore: 0.5,
            stone: 0.5,
            ..Default::default()
        },
        ResourceType::SulfurOre => YieldRates {
            sulfur_ore: 0.5,
            stone: 0.5,
            ..Default::default()
        },
    }
}

/// Tool x resource yield multipliers
pub trait YieldModifiers: Send + Sync {
    fn multiplier(&self, tool: ToolType, resource_type: ResourceType) -> f32;
}

/// Hatchets favour trees, pickaxes favour rock; a rock is average at both
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolModifiers;

impl YieldModifiers for ToolModifiers {
    fn multiplier(&self, tool: ToolType, resource_type: ResourceType) -> f32 {
        let tree = resource_type == ResourceType::Tree;
        match tool {
            ToolType::Hand => 0.5,
            ToolType::Rock => 1.0,
            ToolType::Hatchet if tree => 1.5,
            ToolType::Hatchet => 0.5,
            ToolType::Pickaxe if tree => 0.5,
            ToolType::Pickaxe => 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: u32,
    pub resource_type: ResourceType,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub respawn_at: Option<Instant>,
}

impl ResourceNode {
    pub fn to_data(&self) -> NodeData {
        NodeData {
            node_id: self.id,
            resource_type: self.resource_type,
            position: self.position,
            health: self.health,
            max_health: self.max_health,
            alive: self.alive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatherResult {
    pub node_id: u32,
    pub wood: u32,
    pub stone: u32,
    pub metal_ore: u32,
    pub sulfur_ore: u32,
    pub damage_dealt: f32,
    pub remaining_health: f32,
    pub was_destroyed: bool,
}

impl GatherResult {
    pub fn to_packet(&self) -> Packet {
        Packet::GatherResult {
            node_id: self.node_id,
            wood: self.wood,
            stone: self.stone,
            metal_ore: self.metal_ore,
            sulfur_ore: self.sulfur_ore,
            remaining_health: self.remaining_health,
            was_destroyed: self.was_destroyed,
        }
    }
}

pub struct ResourceLedger {
    nodes: BTreeMap<u32, ResourceNode>,
    next_id: u32,
    respawn_delay: Duration,
    modifiers: Box<dyn YieldModifiers>,
}

impl ResourceLedger {
    pub fn new(respawn_delay: Duration) -> Self {
        Self::with_modifiers(respawn_delay, Box::new(ToolModifiers))
    }

    pub fn with_modifiers(respawn_delay: Duration, modifiers: Box<dyn YieldModifiers>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
            respawn_delay,
            modifiers,
        }
    }

    pub fn spawn(&mut self, resource_type: ResourceType, position: Vec3) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let health = max_health(resource_type);
        self.nodes.insert(
            id,
            ResourceNode {
                id,
                resource_type,
                position,
                health,
                max_health: health,
                alive: true,
                respawn_at: None,
            },
        );
        id
    }

    /// Scatters `nodes_per_type` nodes of every type across the map
    pub fn generate<R: Rng>(&mut self, config: &ServerConfig, rng: &mut R) {
        for resource_type in ResourceType::ALL {
            for _ in 0..config.nodes_per_type {
                let position = Vec3::new(
                    rng.gen_range(0.0..WORLD_SIZE),
                    0.0,
                    rng.gen_range(0.0..WORLD_SIZE),
                );
                self.spawn(resource_type, position);
            }
        }
        info!("Generated {} resource nodes", self.nodes.len());
    }

    pub fn gather(&mut self, node_id: u32, damage: f32, tool: ToolType, actor: u32) -> Option<GatherResult> {
        self.gather_at(node_id, damage, tool, actor, Instant::now())
    }

    pub fn gather_at(
        &mut self,
        node_id: u32,
        damage: f32,
        tool: ToolType,
        actor: u32,
        now: Instant,
    ) -> Option<GatherResult> {
        let node = self.nodes.get_mut(&node_id)?;
        if !node.alive {
            return None;
        }

        let dealt = damage.max(0.0).min(node.health);
        node.health = (node.health - dealt).max(0.0);

        let rates = yield_rates(node.resource_type);
        let mult = self.modifiers.multiplier(tool, node.resource_type);
        let amount = |rate: f32| (dealt * rate * mult).round() as u32;

        let was_destroyed = node.health <= 0.0;
        if was_destroyed {
            node.alive = false;
            node.respawn_at = Some(now + self.respawn_delay);
            debug!("Player {} destroyed node {}", actor, node_id);
        }

        Some(GatherResult {
            node_id,
            wood: amount(rates.wood),
            stone: amount(rates.stone),
            metal_ore: amount(rates.metal_ore),
            sulfur_ore: amount(rates.sulfur_ore),
            damage_dealt: dealt,
            remaining_health: node.health,
            was_destroyed,
        })
    }

    pub fn tick(&mut self) -> Vec<ResourceNode> {
        self.tick_at(Instant::now())
    }

    /// Revives destroyed nodes whose respawn time has come
    pub fn tick_at(&mut self, now: Instant) -> Vec<ResourceNode> {
        let mut revived = Vec::new();
        for node in self.nodes.values_mut() {
            match node.respawn_at {
                Some(at) if !node.alive && at <= now => {
                    node.alive = true;
                    node.health = node.max_health;
                    node.respawn_at = None;
                    revived.push(node.clone());
                }
                _ => {}
            }
        }
        if !revived.is_empty() {
            debug!("{} resource nodes respawned", revived.len());
        }
        revived
    }

    pub fn list(&self) -> Vec<ResourceNode> {
        self.nodes.values().cloned().collect()
    }

    pub fn get(&self, node_id: u32) -> Option<&ResourceNode> {
        self.nodes.get(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
