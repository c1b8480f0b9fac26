//! Packet catalogue and per-packet field layouts

use crate::codec::{self, CodecError, PayloadReader, PayloadWriter, HEADER_LEN};
use crate::types::{Hitbox, ResourceType, Stats, Vec3};
use bytes::{Bytes, BytesMut};

/// Delivery class a packet is sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// In-order, retransmitted until acknowledged
    Reliable,
    /// Latest-wins, stale datagrams are dropped
    Sequenced,
    /// Fire and forget
    Unreliable,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    ConnectionRequest = 1,
    ConnectionAccept = 2,
    ConnectionReject = 3,
    ClientReady = 4,
    PlayerSpawn = 5,
    PlayerMovement = 6,
    Heartbeat = 7,
    PlayerDisconnect = 8,
    InventoryUpdate = 10,
    ItemUse = 11,
    ItemMove = 12,
    ResourceHit = 20,
    GatherResult = 21,
    ResourceUpdate = 22,
    ResourceDestroyed = 23,
    ResourceRespawn = 24,
    ResourcesSync = 25,
    CraftRequest = 30,
    CraftStarted = 31,
    CraftQueueUpdate = 32,
    CraftComplete = 33,
    CraftCancel = 34,
    RecipesSync = 35,
    MeleeAttack = 40,
    RangedAttack = 41,
    AttackResult = 42,
    WeaponEquip = 43,
    WeaponReload = 44,
    WeaponStateUpdate = 45,
    TakeDamageNotify = 46,
    PlayerKilled = 47,
    RespawnRequest = 48,
    RespawnResponse = 49,
    StatsUpdate = 50,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use PacketType::*;
        let packet_type = match value {
            1 => ConnectionRequest,
            2 => ConnectionAccept,
            3 => ConnectionReject,
            4 => ClientReady,
            5 => PlayerSpawn,
            6 => PlayerMovement,
            7 => Heartbeat,
            8 => PlayerDisconnect,
            10 => InventoryUpdate,
            11 => ItemUse,
            12 => ItemMove,
            20 => ResourceHit,
            21 => GatherResult,
            22 => ResourceUpdate,
            23 => ResourceDestroyed,
            24 => ResourceRespawn,
            25 => ResourcesSync,
            30 => CraftRequest,
            31 => CraftStarted,
            32 => CraftQueueUpdate,
            33 => CraftComplete,
            34 => CraftCancel,
            35 => RecipesSync,
            40 => MeleeAttack,
            41 => RangedAttack,
            42 => AttackResult,
            43 => WeaponEquip,
            44 => WeaponReload,
            45 => WeaponStateUpdate,
            46 => TakeDamageNotify,
            47 => PlayerKilled,
            48 => RespawnRequest,
            49 => RespawnResponse,
            50 => StatsUpdate,
            _ => return None,
        };
        Some(packet_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotData {
    pub slot: u32,
    pub item_id: u32,
    pub quantity: u32,
    pub durability: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeData {
    pub node_id: u32,
    pub resource_type: ResourceType,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeData {
    pub recipe_id: u32,
    pub name: String,
    pub result_item: u32,
    pub result_quantity: u32,
    pub duration: f32,
    pub ingredients: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueEntry {
    pub recipe_id: u32,
    pub progress: f32,
    pub remaining_secs: f32,
}

/// Outcome of a melee or ranged attack as reported to clients
#[derive(Debug, Clone, PartialEq)]
pub struct AttackReport {
    pub success: bool,
    pub message: String,
    pub attacker_id: u32,
    pub victim_id: u32,
    pub damage: f32,
    pub hitbox: Hitbox,
    pub distance: f32,
    pub was_killed: bool,
    pub remaining_ammo: u32,
    pub victim_health: f32,
}

/// Every message exchanged between client and server
///
/// Player and target ids of `0` mean "none".
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ConnectionRequest {
        player_name: String,
        client_version: u32,
    },
    ConnectionAccept {
        player_id: u32,
        spawn: Vec3,
    },
    ConnectionReject {
        reason: String,
    },
    ClientReady,
    PlayerSpawn {
        player_id: u32,
        name: String,
        position: Vec3,
        yaw: f32,
    },
    PlayerMovement {
        player_id: u32,
        position: Vec3,
        yaw: f32,
        pitch: f32,
    },
    Heartbeat {
        timestamp: u64,
    },
    PlayerDisconnect {
        player_id: u32,
        reason: String,
    },

    InventoryUpdate {
        slots: Vec<SlotData>,
    },
    ItemUse {
        slot: u32,
    },
    ItemMove {
        from: u32,
        to: u32,
    },

    ResourceHit {
        node_id: u32,
        tool_item_id: u32,
    },
    GatherResult {
        node_id: u32,
        wood: u32,
        stone: u32,
        metal_ore: u32,
        sulfur_ore: u32,
        remaining_health: f32,
        was_destroyed: bool,
    },
    ResourceUpdate {
        node_id: u32,
        health: f32,
    },
    ResourceDestroyed {
        node_id: u32,
    },
    ResourceRespawn {
        node_id: u32,
        health: f32,
    },
    ResourcesSync {
        nodes: Vec<NodeData>,
    },

    CraftRequest {
        recipe_id: u32,
        amount: u32,
    },
    CraftStarted {
        success: bool,
        message: String,
        recipe_id: u32,
        duration: f32,
    },
    CraftQueueUpdate {
        entries: Vec<QueueEntry>,
    },
    CraftComplete {
        recipe_id: u32,
        item_id: u32,
        quantity: u32,
    },
    CraftCancel {
        queue_index: u32,
    },
    RecipesSync {
        recipes: Vec<RecipeData>,
    },

    MeleeAttack {
        target_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        direction: Vec3,
    },
    RangedAttack {
        target_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
        direction: Vec3,
        distance: f32,
    },
    AttackResult(AttackReport),
    WeaponEquip {
        item_id: u32,
    },
    WeaponReload,
    WeaponStateUpdate {
        item_id: u32,
        ammo: u32,
        reserve: u32,
        reloading: bool,
    },
    TakeDamageNotify {
        attacker_id: u32,
        damage: f32,
        hitbox: Hitbox,
        health: f32,
    },
    PlayerKilled {
        victim_id: u32,
        killer_id: u32,
        weapon_item_id: u32,
        hitbox: Hitbox,
    },
    RespawnRequest,
    RespawnResponse {
        success: bool,
        position: Vec3,
        health: f32,
    },
    StatsUpdate {
        stats: Stats,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ConnectionRequest { .. } => PacketType::ConnectionRequest,
            Packet::ConnectionAccept { .. } => PacketType::ConnectionAccept,
            Packet::ConnectionReject { .. } => PacketType::ConnectionReject,
            Packet::ClientReady => PacketType::ClientReady,
            Packet::PlayerSpawn { .. } => PacketType::PlayerSpawn,
            Packet::PlayerMovement { .. } => PacketType::PlayerMovement,
            Packet::Heartbeat { .. } => PacketType::Heartbeat,
            Packet::PlayerDisconnect { .. } => PacketType::PlayerDisconnect,
            Packet::InventoryUpdate { .. } => PacketType::InventoryUpdate,
            Packet::ItemUse { .. } => PacketType::ItemUse,
            Packet::ItemMove { .. } => PacketType::ItemMove,
            Packet::ResourceHit { .. } => PacketType::ResourceHit,
            Packet::GatherResult { .. } => PacketType::GatherResult,
            Packet::ResourceUpdate { .. } => PacketType::ResourceUpdate,
            Packet::ResourceDestroyed { .. } => PacketType::ResourceDestroyed,
            Packet::ResourceRespawn { .. } => PacketType::ResourceRespawn,
            Packet::ResourcesSync { .. } => PacketType::ResourcesSync,
            Packet::CraftRequest { .. } => PacketType::CraftRequest,
            Packet::CraftStarted { .. } => PacketType::CraftStarted,
            Packet::CraftQueueUpdate { .. } => PacketType::CraftQueueUpdate,
            Packet::CraftComplete { .. } => PacketType::CraftComplete,
            Packet::CraftCancel { .. } => PacketType::CraftCancel,
            Packet::RecipesSync { .. } => PacketType::RecipesSync,
            Packet::MeleeAttack { .. } => PacketType::MeleeAttack,
            Packet::RangedAttack { .. } => PacketType::RangedAttack,
            Packet::AttackResult(_) => PacketType::AttackResult,
            Packet::WeaponEquip { .. } => PacketType::WeaponEquip,
            Packet::WeaponReload => PacketType::WeaponReload,
            Packet::WeaponStateUpdate { .. } => PacketType::WeaponStateUpdate,
            Packet::TakeDamageNotify { .. } => PacketType::TakeDamageNotify,
            Packet::PlayerKilled { .. } => PacketType::PlayerKilled,
            Packet::RespawnRequest => PacketType::RespawnRequest,
            Packet::RespawnResponse { .. } => PacketType::RespawnResponse,
            Packet::StatsUpdate { .. } => PacketType::StatsUpdate,
        }
    }

    /// Movement is latest-wins, stats and heartbeats are loss tolerant,
    /// everything else must arrive in order.
    pub fn delivery(&self) -> Delivery {
        match self {
            Packet::PlayerMovement { .. } => Delivery::Sequenced,
            Packet::StatsUpdate { .. } | Packet::Heartbeat { .. } => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }

    /// Encodes the packet into an envelope, using `scratch` for the payload
    pub fn encode_with(&self, scratch: &mut BytesMut) -> Bytes {
        scratch.clear();
        self.write_payload(&mut PayloadWriter::new(scratch));

        let mut out = BytesMut::with_capacity(HEADER_LEN + scratch.len());
        codec::encode_into(&mut out, self.packet_type() as u8, scratch);
        out.freeze()
    }

    pub fn to_bytes(&self) -> Bytes {
        self.encode_with(&mut BytesMut::new())
    }

    /// Decodes an envelope. Unknown packet types yield `Ok(None)`.
    pub fn decode(bytes: &[u8]) -> Result<Option<Packet>, CodecError> {
        let (raw_type, payload) = codec::decode(bytes)?;
        match PacketType::from_u8(raw_type) {
            Some(packet_type) => Self::read_payload(packet_type, payload).map(Some),
            None => Ok(None),
        }
    }

    fn write_payload(&self, w: &mut PayloadWriter<'_>) {
        match self {
            Packet::ConnectionRequest {
                player_name,
                client_version,
            } => {
                w.string(player_name).u32(*client_version);
            }
            Packet::ConnectionAccept { player_id, spawn } => {
                w.u32(*player_id);
                put_vec3(w, spawn);
            }
            Packet::ConnectionReject { reason } => {
                w.string(reason);
            }
            Packet::ClientReady | Packet::WeaponReload | Packet::RespawnRequest => {}
            Packet::PlayerSpawn {
                player_id,
                name,
                position,
                yaw,
            } => {
                w.u32(*player_id).string(name);
                put_vec3(w, position);
                w.f32(*yaw);
            }
            Packet::PlayerMovement {
                player_id,
                position,
                yaw,
                pitch,
            } => {
                w.u32(*player_id);
                put_vec3(w, position);
                w.f32(*yaw).f32(*pitch);
            }
            Packet::Heartbeat { timestamp } => {
                w.u64(*timestamp);
            }
            Packet::PlayerDisconnect { player_id, reason } => {
                w.u32(*player_id).string(reason);
            }
            Packet::InventoryUpdate { slots } => {
                w.list(slots, |w, slot| {
                    w.u32(slot.slot)
                        .u32(slot.item_id)
                        .u32(slot.quantity)
                        .f32(slot.durability);
                });
            }
            Packet::ItemUse { slot } => {
                w.u32(*slot);
            }
            Packet::ItemMove { from, to } => {
                w.u32(*from).u32(*to);
            }
            Packet::ResourceHit {
                node_id,
                tool_item_id,
            } => {
                w.u32(*node_id).u32(*tool_item_id);
            }
            Packet::GatherResult {
                node_id,
                wood,
                stone,
                metal_ore,
                sulfur_ore,
                remaining_health,
                was_destroyed,
            } => {
                w.u32(*node_id)
                    .u32(*wood)
                    .u32(*stone)
                    .u32(*metal_ore)
                    .u32(*sulfur_ore)
                    .f32(*remaining_health)
                    .bool(*was_destroyed);
            }
            Packet::ResourceUpdate { node_id, health }
            | Packet::ResourceRespawn { node_id, health } => {
                w.u32(*node_id).f32(*health);
            }
            Packet::ResourceDestroyed { node_id } => {
                w.u32(*node_id);
            }
            Packet::ResourcesSync { nodes } => {
                w.list(nodes, |w, node| {
                    w.u32(node.node_id).u8(node.resource_type.to_u8());
                    put_vec3(w, &node.position);
                    w.f32(node.health).f32(node.max_health).bool(node.alive);
                });
            }
            Packet::CraftRequest { recipe_id, amount } => {
                w.u32(*recipe_id).u32(*amount);
            }
            Packet::CraftStarted {
                success,
                message,
                recipe_id,
                duration,
            } => {
                w.bool(*success)
                    .string(message)
                    .u32(*recipe_id)
                    .f32(*duration);
            }
            Packet::CraftQueueUpdate { entries } => {
                w.list(entries, |w, entry| {
                    w.u32(entry.recipe_id)
                        .f32(entry.progress)
                        .f32(entry.remaining_secs);
                });
            }
            Packet::CraftComplete {
                recipe_id,
                item_id,
                quantity,
            } => {
                w.u32(*recipe_id).u32(*item_id).u32(*quantity);
            }
            Packet::CraftCancel { queue_index } => {
                w.u32(*queue_index);
            }
            Packet::RecipesSync { recipes } => {
                w.list(recipes, |w, recipe| {
                    w.u32(recipe.recipe_id)
                        .string(&recipe.name)
                        .u32(recipe.result_item)
                        .u32(recipe.result_quantity)
                        .f32(recipe.duration)
                        .list(&recipe.ingredients, |w, (item_id, quantity)| {
                            w.u32(*item_id).u32(*quantity);
                        });
                });
            }
            Packet::MeleeAttack {
                target_id,
                weapon_item_id,
                hitbox,
                direction,
            } => {
                w.u32(*target_id).u32(*weapon_item_id).u8(hitbox.to_u8());
                put_vec3(w, direction);
            }
            Packet::RangedAttack {
                target_id,
                weapon_item_id,
                hitbox,
                direction,
                distance,
            } => {
                w.u32(*target_id).u32(*weapon_item_id).u8(hitbox.to_u8());
                put_vec3(w, direction);
                w.f32(*distance);
            }
            Packet::AttackResult(report) => {
                w.bool(report.success)
                    .string(&report.message)
                    .u32(report.attacker_id)
                    .u32(report.victim_id)
                    .f32(report.damage)
                    .u8(report.hitbox.to_u8())
                    .f32(report.distance)
                    .bool(report.was_killed)
                    .u32(report.remaining_ammo)
                    .f32(report.victim_health);
            }
            Packet::WeaponEquip { item_id } => {
                w.u32(*item_id);
            }
            Packet::WeaponStateUpdate {
                item_id,
                ammo,
                reserve,
                reloading,
            } => {
                w.u32(*item_id).u32(*ammo).u32(*reserve).bool(*reloading);
            }
            Packet::TakeDamageNotify {
                attacker_id,
                damage,
                hitbox,
                health,
            } => {
                w.u32(*attacker_id)
                    .f32(*damage)
                    .u8(hitbox.to_u8())
                    .f32(*health);
            }
            Packet::PlayerKilled {
                victim_id,
                killer_id,
                weapon_item_id,
                hitbox,
            } => {
                w.u32(*victim_id)
                    .u32(*killer_id)
                    .u32(*weapon_item_id)
                    .u8(hitbox.to_u8());
            }
            Packet::RespawnResponse {
                success,
                position,
                health,
            } => {
                w.bool(*success);
                put_vec3(w, position);
                w.f32(*health);
            }
            Packet::StatsUpdate { stats } => {
                w.f32(stats.health)
                    .f32(stats.hunger)
                    .f32(stats.thirst)
                    .f32(stats.temperature);
            }
        }
    }

    fn read_payload(packet_type: PacketType, payload: &[u8]) -> Result<Packet, CodecError> {
        let mut r = PayloadReader::new(payload);
        let packet = match packet_type {
            PacketType::ConnectionRequest => Packet::ConnectionRequest {
                player_name: r.string()?,
                client_version: r.u32()?,
            },
            PacketType::ConnectionAccept => Packet::ConnectionAccept {
                player_id: r.u32()?,
                spawn: read_vec3(&mut r)?,
            },
            PacketType::ConnectionReject => Packet::ConnectionReject { reason: r.string()? },
            PacketType::ClientReady => Packet::ClientReady,
            PacketType::PlayerSpawn => Packet::PlayerSpawn {
                player_id: r.u32()?,
                name: r.string()?,
                position: read_vec3(&mut r)?,
                yaw: r.f32()?,
            },
            PacketType::PlayerMovement => Packet::PlayerMovement {
                player_id: r.u32()?,
                position: read_vec3(&mut r)?,
                yaw: r.f32()?,
                pitch: r.f32()?,
            },
            PacketType::Heartbeat => Packet::Heartbeat { timestamp: r.u64()? },
            PacketType::PlayerDisconnect => Packet::PlayerDisconnect {
                player_id: r.u32()?,
                reason: r.string()?,
            },
            PacketType::InventoryUpdate => Packet::InventoryUpdate {
                slots: r.list(16, |r| {
                    Ok(SlotData {
                        slot: r.u32()?,
                        item_id: r.u32()?,
                        quantity: r.u32()?,
                        durability: r.f32()?,
                    })
                })?,
            },
            PacketType::ItemUse => Packet::ItemUse { slot: r.u32()? },
            PacketType::ItemMove => Packet::ItemMove {
                from: r.u32()?,
                to: r.u32()?,
            },
            PacketType::ResourceHit => Packet::ResourceHit {
                node_id: r.u32()?,
                tool_item_id: r.u32()?,
            },
            PacketType::GatherResult => Packet::GatherResult {
                node_id: r.u32()?,
                wood: r.u32()?,
                stone: r.u32()?,
                metal_ore: r.u32()?,
                sulfur_ore: r.u32()?,
                remaining_health: r.f32()?,
                was_destroyed: r.bool()?,
            },
            PacketType::ResourceUpdate => Packet::ResourceUpdate {
                node_id: r.u32()?,
                health: r.f32()?,
            },
            PacketType::ResourceDestroyed => Packet::ResourceDestroyed { node_id: r.u32()? },
            PacketType::ResourceRespawn => Packet::ResourceRespawn {
                node_id: r.u32()?,
                health: r.f32()?,
            },
            PacketType::ResourcesSync => Packet::ResourcesSync {
                nodes: r.list(26, |r| {
                    Ok(NodeData {
                        node_id: r.u32()?,
                        resource_type: read_resource_type(r)?,
                        position: read_vec3(r)?,
                        health: r.f32()?,
                        max_health: r.f32()?,
                        alive: r.bool()?,
                    })
                })?,
            },
            PacketType::CraftRequest => Packet::CraftRequest {
                recipe_id: r.u32()?,
                amount: r.u32()?,
            },
            PacketType::CraftStarted => Packet::CraftStarted {
                success: r.bool()?,
                message: r.string()?,
                recipe_id: r.u32()?,
                duration: r.f32()?,
            },
            PacketType::CraftQueueUpdate => Packet::CraftQueueUpdate {
                entries: r.list(12, |r| {
                    Ok(QueueEntry {
                        recipe_id: r.u32()?,
                        progress: r.f32()?,
                        remaining_secs: r.f32()?,
                    })
                })?,
            },
            PacketType::CraftComplete => Packet::CraftComplete {
                recipe_id: r.u32()?,
                item_id: r.u32()?,
                quantity: r.u32()?,
            },
            PacketType::CraftCancel => Packet::CraftCancel {
                queue_index: r.u32()?,
            },
            PacketType::RecipesSync => Packet::RecipesSync {
                recipes: r.list(24, |r| {
                    Ok(RecipeData {
                        recipe_id: r.u32()?,
                        name: r.string()?,
                        result_item: r.u32()?,
                        result_quantity: r.u32()?,
                        duration: r.f32()?,
                        ingredients: r.list(8, |r| Ok((r.u32()?, r.u32()?)))?,
                    })
                })?,
            },
            PacketType::MeleeAttack => Packet::MeleeAttack {
                target_id: r.u32()?,
                weapon_item_id: r.u32()?,
                hitbox: read_hitbox(&mut r)?,
                direction: read_vec3(&mut r)?,
            },
            PacketType::RangedAttack => Packet::RangedAttack {
                target_id: r.u32()?,
                weapon_item_id: r.u32()?,
                hitbox: read_hitbox(&mut r)?,
                direction: read_vec3(&mut r)?,
                distance: r.f32()?,
            },
            PacketType::AttackResult => Packet::AttackResult(AttackReport {
                success: r.bool()?,
                message: r.string()?,
                attacker_id: r.u32()?,
                victim_id: r.u32()?,
                damage: r.f32()?,
                hitbox: read_hitbox(&mut r)?,
                distance: r.f32()?,
                was_killed: r.bool()?,
                remaining_ammo: r.u32()?,
                victim_health: r.f32()?,
            }),
            PacketType::WeaponEquip => Packet::WeaponEquip { item_id: r.u32()? },
            PacketType::WeaponReload => Packet::WeaponReload,
            PacketType::WeaponStateUpdate => Packet::WeaponStateUpdate {
                item_id: r.u32()?,
                ammo: r.u32()?,
                reserve: r.u32()?,
                reloading: r.bool()?,
            },
            PacketType::TakeDamageNotify => Packet::TakeDamageNotify {
                attacker_id: r.u32()?,
                damage: r.f32()?,
                hitbox: read_hitbox(&mut r)?,
                health: r.f32()?,
            },
            PacketType::PlayerKilled => Packet::PlayerKilled {
                victim_id: r.u32()?,
                killer_id: r.u32()?,
                weapon_item_id: r.u32()?,
                hitbox: read_hitbox(&mut r)?,
            },
            PacketType::RespawnRequest => Packet::RespawnRequest,
            PacketType::RespawnResponse => Packet::RespawnResponse {
                success: r.bool()?,
                position: read_vec3(&mut r)?,
                health: r.f32()?,
            },
            PacketType::StatsUpdate => Packet::StatsUpdate {
                stats: Stats {
                    health: r.f32()?,
                    hunger: r.f32()?,
                    thirst: r.f32()?,
                    temperature: r.f32()?,
                },
            },
        };
        Ok(packet)
    }
}

fn put_vec3(w: &mut PayloadWriter<'_>, v: &Vec3) {
    w.f32(v.x).f32(v.y).f32(v.z);
}

fn read_vec3(r: &mut PayloadReader<'_>) -> Result<Vec3, CodecError> {
    Ok(Vec3 {
        x: r.f32()?,
        y: r.f32()?,
        z: r.f32()?,
    })
}

fn read_hitbox(r: &mut PayloadReader<'_>) -> Result<Hitbox, CodecError> {
    let raw = r.u8()?;
    Hitbox::from_u8(raw)
        .ok_or_else(|| CodecError::MalformedPacket(format!("unknown hitbox {}", raw)))
}

fn read_resource_type(r: &mut PayloadReader<'_>) -> Result<ResourceType, CodecError> {
    let raw = r.u8()?;
    ResourceType::from_u8(raw)
        .ok_or_else(|| CodecError::MalformedPacket(format!("unknown resource type {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_request_layout() {
        let packet = Packet::ConnectionRequest {
            player_name: "Ann".to_string(),
            client_version: 2,
        };
        let bytes = packet.to_bytes();

        assert_eq!(bytes[0], PacketType::ConnectionRequest as u8);
        assert_eq!(&bytes[1..5], &11u32.to_le_bytes());
        assert_eq!(&bytes[5..9], &3u32.to_le_bytes());
        assert_eq!(&bytes[9..12], b"Ann");
        assert_eq!(&bytes[12..16], &2u32.to_le_bytes());
    }

    #[test]
    fn test_decode_connection_request() {
        let packet = Packet::ConnectionRequest {
            player_name: "Ann".to_string(),
            client_version: 2,
        };

        match Packet::decode(&packet.to_bytes()).unwrap() {
            Some(Packet::ConnectionRequest {
                player_name,
                client_version,
            }) => {
                assert_eq!(player_name, "Ann");
                assert_eq!(client_version, 2);
            }
            other => panic!("Wrong packet after decode: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let bytes = codec::encode(200, &[1, 2, 3]);
        assert_eq!(Packet::decode(&bytes), Ok(None));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let bytes = Packet::ItemMove { from: 1, to: 2 }.to_bytes();
        // Rewrite the envelope so the declared length matches the shorter payload
        let short = codec::encode(PacketType::ItemMove as u8, &bytes[5..7]);
        assert!(Packet::decode(&short).is_err());
    }

    #[test]
    fn test_invalid_hitbox_is_malformed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(77);
        payload.extend_from_slice(&[0u8; 12]);
        let bytes = codec::encode(PacketType::MeleeAttack as u8, &payload);

        assert!(matches!(
            Packet::decode(&bytes),
            Err(CodecError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_recipes_sync_nested_lists() {
        let packet = Packet::RecipesSync {
            recipes: vec![RecipeData {
                recipe_id: 3,
                name: "Stone Hatchet".to_string(),
                result_item: 101,
                result_quantity: 1,
                duration: 10.0,
                ingredients: vec![(1, 200), (2, 100)],
            }],
        };

        assert_eq!(Packet::decode(&packet.to_bytes()).unwrap(), Some(packet));
    }

    #[test]
    fn test_scratch_buffer_is_reused() {
        let mut scratch = BytesMut::with_capacity(64);
        let first = Packet::Heartbeat { timestamp: 1 }.encode_with(&mut scratch);
        let second = Packet::ResourceDestroyed { node_id: 9 }.encode_with(&mut scratch);

        assert_eq!(first.len(), HEADER_LEN + 8);
        assert_eq!(second.len(), HEADER_LEN + 4);
        assert_eq!(
            Packet::decode(&first).unwrap(),
            Some(Packet::Heartbeat { timestamp: 1 })
        );
    }

    #[test]
    fn test_delivery_classes() {
        let movement = Packet::PlayerMovement {
            player_id: 1,
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        };
        assert_eq!(movement.delivery(), Delivery::Sequenced);
        assert_eq!(
            Packet::StatsUpdate {
                stats: Stats::default()
            }
            .delivery(),
            Delivery::Unreliable
        );
        assert_eq!(Packet::ClientReady.delivery(), Delivery::Reliable);
        assert_eq!(
            Packet::CraftStarted {
                success: false,
                message: "Queue full".to_string(),
                recipe_id: 1,
                duration: 0.0,
            }
            .delivery(),
            Delivery::Reliable
        );
    }
}
