//! Item catalogue shared by client and server
//!
//! Item ids are part of the wire protocol, so the catalogue lives here rather
//! than in the server.

use crate::types::{DamageType, ToolType};
use serde::{Deserialize, Serialize};

pub mod ids {
    pub const WOOD: u32 = 1;
    pub const STONE: u32 = 2;
    pub const METAL_ORE: u32 = 3;
    pub const SULFUR_ORE: u32 = 4;
    pub const METAL_FRAGMENTS: u32 = 5;
    pub const CLOTH: u32 = 6;
    pub const GUNPOWDER: u32 = 7;

    pub const ROCK: u32 = 100;
    pub const STONE_HATCHET: u32 = 101;
    pub const STONE_PICKAXE: u32 = 102;
    pub const METAL_HATCHET: u32 = 103;
    pub const METAL_PICKAXE: u32 = 104;

    pub const WOODEN_SPEAR: u32 = 200;
    pub const MACHETE: u32 = 201;
    pub const HUNTING_BOW: u32 = 210;
    pub const PISTOL: u32 = 211;

    pub const WOODEN_ARROW: u32 = 220;
    pub const PISTOL_BULLET: u32 = 221;

    pub const APPLE: u32 = 300;
    pub const WATER_BOTTLE: u32 = 301;
    pub const BANDAGE: u32 = 302;

    pub const WOOD_ARMOR: u32 = 400;
    pub const METAL_ARMOR: u32 = 401;
}

/// One occupied inventory slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: u32,
    pub quantity: u32,
    pub durability: f32,
}

impl ItemStack {
    pub fn new(item_id: u32, quantity: u32) -> Self {
        Self {
            item_id,
            quantity,
            durability: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeleeStats {
    pub damage: f32,
    pub damage_type: DamageType,
    pub reach: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangedStats {
    pub damage: f32,
    pub damage_type: DamageType,
    pub max_range: f32,
    pub magazine: u32,
    pub ammo_item: u32,
    pub reload_secs: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemKind {
    Resource,
    Tool {
        tool: ToolType,
        gather_damage: f32,
        melee: MeleeStats,
    },
    Melee(MeleeStats),
    Ranged(RangedStats),
    Ammo,
    Consumable {
        health: f32,
        hunger: f32,
        thirst: f32,
    },
    Armor {
        value: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemDef {
    pub id: u32,
    pub name: &'static str,
    pub max_stack: u32,
    pub kind: ItemKind,
}

impl ItemDef {
    /// Melee profile for weapons and tools (tools double as clubs)
    pub fn melee_stats(&self) -> Option<MeleeStats> {
        match self.kind {
            ItemKind::Melee(stats) => Some(stats),
            ItemKind::Tool { melee, .. } => Some(melee),
            _ => None,
        }
    }

    pub fn ranged_stats(&self) -> Option<RangedStats> {
        match self.kind {
            ItemKind::Ranged(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn is_weapon(&self) -> bool {
        matches!(
            self.kind,
            ItemKind::Melee(_) | ItemKind::Ranged(_) | ItemKind::Tool { .. }
        )
    }
}

/// Fists, used when nothing is equipped
pub const UNARMED: MeleeStats = MeleeStats {
    damage: 5.0,
    damage_type: DamageType::Blunt,
    reach: 2.0,
};

/// Gather damage dealt with bare hands
pub const HAND_GATHER_DAMAGE: f32 = 5.0;

const fn tool(
    id: u32,
    name: &'static str,
    tool: ToolType,
    gather_damage: f32,
    damage: f32,
    damage_type: DamageType,
) -> ItemDef {
    ItemDef {
        id,
        name,
        max_stack: 1,
        kind: ItemKind::Tool {
            tool,
            gather_damage,
            melee: MeleeStats {
                damage,
                damage_type,
                reach: 2.5,
            },
        },
    }
}

const fn material(id: u32, name: &'static str) -> ItemDef {
    ItemDef {
        id,
        name,
        max_stack: 1000,
        kind: ItemKind::Resource,
    }
}

pub static ITEMS: &[ItemDef] = &[
    material(ids::WOOD, "Wood"),
    material(ids::STONE, "Stone"),
    material(ids::METAL_ORE, "Metal Ore"),
    material(ids::SULFUR_ORE, "Sulfur Ore"),
    material(ids::METAL_FRAGMENTS, "Metal Fragments"),
    material(ids::CLOTH, "Cloth"),
    material(ids::GUNPOWDER, "Gunpowder"),
    tool(ids::ROCK, "Rock", ToolType::Rock, 10.0, 8.0, DamageType::Blunt),
    tool(ids::STONE_HATCHET, "Stone Hatchet", ToolType::Hatchet, 15.0, 12.0, DamageType::Slash),
    tool(ids::STONE_PICKAXE, "Stone Pickaxe", ToolType::Pickaxe, 15.0, 12.0, DamageType::Stab),
    tool(ids::METAL_HATCHET, "Metal Hatchet", ToolType::Hatchet, 25.0, 18.0, DamageType::Slash),
    tool(ids::METAL_PICKAXE, "Metal Pickaxe", ToolType::Pickaxe, 25.0, 18.0, DamageType::Stab),
    ItemDef {
        id: ids::WOODEN_SPEAR,
        name: "Wooden Spear",
        max_stack: 1,
        kind: ItemKind::Melee(MeleeStats {
            damage: 25.0,
            damage_type: DamageType::Stab,
            reach: 3.0,
        }),
    },
    ItemDef {
        id: ids::MACHETE,
        name: "Machete",
        max_stack: 1,
        kind: ItemKind::Melee(MeleeStats {
            damage: 30.0,
            damage_type: DamageType::Slash,
            reach: 2.5,
        }),
    },
    ItemDef {
        id: ids::HUNTING_BOW,
        name: "Hunting Bow",
        max_stack: 1,
        kind: ItemKind::Ranged(RangedStats {
            damage: 40.0,
            damage_type: DamageType::Arrow,
            max_range: 80.0,
            magazine: 1,
            ammo_item: ids::WOODEN_ARROW,
            reload_secs: 1.0,
        }),
    },
    ItemDef {
        id: ids::PISTOL,
        name: "Pistol",
        max_stack: 1,
        kind: ItemKind::Ranged(RangedStats {
            damage: 30.0,
            damage_type: DamageType::Bullet,
            max_range: 120.0,
            magazine: 12,
            ammo_item: ids::PISTOL_BULLET,
            reload_secs: 2.0,
        }),
    },
    ItemDef {
        id: ids::WOODEN_ARROW,
        name: "Wooden Arrow",
        max_stack: 64,
        kind: ItemKind::Ammo,
    },
    ItemDef {
        id: ids::PISTOL_BULLET,
        name: "Pistol Bullet",
        max_stack: 128,
        kind: ItemKind::Ammo,
    },
    ItemDef {
        id: ids::APPLE,
        name: "Apple",
        max_stack: 20,
        kind: ItemKind::Consumable {
            health: 2.0,
            hunger: 20.0,
            thirst: 5.0,
        },
    },
    ItemDef {
        id: ids::WATER_BOTTLE,
        name: "Water Bottle",
        max_stack: 10,
        kind: ItemKind::Consumable {
            health: 0.0,
            hunger: 0.0,
            thirst: 40.0,
        },
    },
    ItemDef {
        id: ids::BANDAGE,
        name: "Bandage",
        max_stack: 10,
        kind: ItemKind::Consumable {
            health: 15.0,
            hunger: 0.0,
            thirst: 0.0,
        },
    },
    ItemDef {
        id: ids::WOOD_ARMOR,
        name: "Wood Armor",
        max_stack: 1,
        kind: ItemKind::Armor { value: 25.0 },
    },
    ItemDef {
        id: ids::METAL_ARMOR,
        name: "Metal Armor",
        max_stack: 1,
        kind: ItemKind::Armor { value: 60.0 },
    },
];

pub fn find(item_id: u32) -> Option<&'static ItemDef> {
    ITEMS.iter().find(|def| def.id == item_id)
}

/// Stack limit for `item_id`, zero for unknown items
pub fn max_stack(item_id: u32) -> u32 {
    find(item_id).map(|def| def.max_stack).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_item_ids_unique() {
        let mut seen = HashSet::new();
        for def in ITEMS {
            assert!(seen.insert(def.id), "duplicate item id {}", def.id);
        }
    }

    #[test]
    fn test_tools_are_melee_capable() {
        let rock = find(ids::ROCK).unwrap();
        assert!(rock.melee_stats().is_some());
        assert!(rock.ranged_stats().is_none());
        assert!(rock.is_weapon());
    }

    #[test]
    fn test_ranged_ammo_is_known() {
        for def in ITEMS {
            if let Some(stats) = def.ranged_stats() {
                let ammo = find(stats.ammo_item).expect("ammo item must exist");
                assert_eq!(ammo.kind, ItemKind::Ammo);
                assert!(stats.magazine > 0);
            }
        }
    }

    #[test]
    fn test_unknown_item_has_no_stack() {
        assert_eq!(max_stack(9999), 0);
        assert_eq!(max_stack(ids::WOOD), 1000);
    }
}
