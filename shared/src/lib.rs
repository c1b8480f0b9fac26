//! Protocol types shared by the server and its clients
//!
//! - [`codec`]: envelope framing and field readers/writers
//! - [`packets`]: the packet catalogue and delivery classes
//! - [`link`]: reliable / sequenced / unreliable channels over UDP
//! - [`items`]: item ids and definitions
//! - [`types`]: small value types used across the protocol

pub mod codec;
pub mod items;
pub mod link;
pub mod packets;
pub mod types;

pub use codec::CodecError;
pub use items::{ItemDef, ItemKind, ItemStack};
pub use link::{Incoming, LinkError, PeerLink};
pub use packets::{AttackReport, Delivery, NodeData, Packet, PacketType, QueueEntry, RecipeData, SlotData};
pub use types::{DamageType, Hitbox, ResourceType, Stats, ToolType, Vec3};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 7777;
pub const INVENTORY_SIZE: usize = 30;
pub const WORLD_SIZE: f32 = 1000.0;
