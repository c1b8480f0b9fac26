use serde::{Deserialize, Serialize};

pub const MAX_STAT: f32 = 100.0;
pub const AMBIENT_TEMPERATURE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Survival stats. Health, hunger and thirst live in `[0, 100]`;
/// temperature is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
    pub temperature: f32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            health: MAX_STAT,
            hunger: MAX_STAT,
            thirst: MAX_STAT,
            temperature: AMBIENT_TEMPERATURE,
        }
    }
}

impl Stats {
    pub fn clamp(&mut self) {
        self.health = self.health.clamp(0.0, MAX_STAT);
        self.hunger = self.hunger.clamp(0.0, MAX_STAT);
        self.thirst = self.thirst.clamp(0.0, MAX_STAT);
    }
}

/// Body region struck by an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hitbox {
    Head,
    Chest,
    Stomach,
    Arms,
    Legs,
}

impl Hitbox {
    pub const ALL: [Hitbox; 5] = [
        Hitbox::Head,
        Hitbox::Chest,
        Hitbox::Stomach,
        Hitbox::Arms,
        Hitbox::Legs,
    ];

    pub fn multiplier(self) -> f32 {
        match self {
            Hitbox::Head => 2.0,
            Hitbox::Chest => 1.0,
            Hitbox::Stomach => 0.9,
            Hitbox::Arms => 0.6,
            Hitbox::Legs => 0.6,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Hitbox::Head => 0,
            Hitbox::Chest => 1,
            Hitbox::Stomach => 2,
            Hitbox::Arms => 3,
            Hitbox::Legs => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Slash,
    Blunt,
    Stab,
    Bullet,
    Arrow,
}

impl DamageType {
    pub fn multiplier(self) -> f32 {
        match self {
            DamageType::Slash => 1.0,
            DamageType::Blunt => 0.9,
            DamageType::Stab => 1.1,
            DamageType::Bullet => 1.0,
            DamageType::Arrow => 1.0,
        }
    }

    /// Fraction of the armour absorption that applies to this damage type
    pub fn armor_effectiveness(self) -> f32 {
        match self {
            DamageType::Slash => 1.0,
            DamageType::Blunt => 0.6,
            DamageType::Stab => 0.8,
            DamageType::Bullet => 0.7,
            DamageType::Arrow => 0.9,
        }
    }
}

/// Kind of gatherable world node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Tree,
    Stone,
    MetalOre,
    SulfurOre,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Tree,
        ResourceType::Stone,
        ResourceType::MetalOre,
        ResourceType::SulfurOre,
    ];

    pub fn to_u8(self) -> u8 {
        match self {
            ResourceType::Tree => 0,
            ResourceType::Stone => 1,
            ResourceType::MetalOre => 2,
            ResourceType::SulfurOre => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

/// Gathering tool class, used to bias yields per resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolType {
    Hand,
    Rock,
    Hatchet,
    Pickaxe,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert_approx_eq!(a.distance(&b), 5.0, 0.0001);
    }

    #[test]
    fn test_stats_clamp_leaves_temperature() {
        let mut stats = Stats {
            health: 150.0,
            hunger: -5.0,
            thirst: 50.0,
            temperature: -30.0,
        };
        stats.clamp();
        assert_eq!(stats.health, 100.0);
        assert_eq!(stats.hunger, 0.0);
        assert_eq!(stats.thirst, 50.0);
        assert_eq!(stats.temperature, -30.0);
    }

    #[test]
    fn test_hitbox_ordering() {
        assert!(Hitbox::Head.multiplier() > Hitbox::Chest.multiplier());
        assert!(Hitbox::Chest.multiplier() > Hitbox::Stomach.multiplier());
        assert!(Hitbox::Stomach.multiplier() > Hitbox::Arms.multiplier());
        assert_eq!(Hitbox::Arms.multiplier(), Hitbox::Legs.multiplier());
    }

    #[test]
    fn test_hitbox_wire_values() {
        for hitbox in Hitbox::ALL {
            assert_eq!(Hitbox::from_u8(hitbox.to_u8()), Some(hitbox));
        }
        assert_eq!(Hitbox::from_u8(9), None);
    }
}
