//! # Survival Game Server Library
//!
//! Authoritative server for a multiplayer survival game. Clients only ask;
//! every gather, craft, hit and respawn is decided here and the outcome is
//! pushed back to the clients that need to know.
//!
//! ## Core Responsibilities
//!
//! ### World State
//! The server owns the canonical copy of every player (position, survival
//! stats, inventory, combat state) and every gatherable resource node.
//! Clients receive the world once when they join and incremental updates
//! afterwards.
//!
//! ### Session Lifecycle
//! Each remote peer gets a session that walks through a small state machine:
//! - `Connecting`: waiting for a `ConnectionRequest`
//! - `AwaitingReady`: accepted, waiting for the client to load
//! - `Syncing`: streaming inventory, players, nodes and recipes
//! - `Active`: gameplay packets are accepted
//! - `Disconnected`: terminal, reached at most once per session
//!
//! ### Validation
//! Nothing a client claims is taken at face value. Gather reach, ingredient
//! counts, weapon ownership, ammunition and attack range are all checked
//! against server state before anything changes. Rejected requests get an
//! explicit negative reply where the client is waiting for one.
//!
//! ## Architecture Design
//!
//! ### Shared Context
//! All state lives in one [`context::ServerContext`] behind tokio locks and
//! is shared by the session tasks and the tick loops. Locks are taken in the
//! order players, resources, crafting, combat, and are released before any
//! packet is queued.
//!
//! ### Per-Session Tasks
//! Inbound datagrams are routed to a task per session through an ordered
//! channel, so packets from one client are handled strictly in arrival order
//! while different clients proceed concurrently.
//!
//! ### UDP Transport
//! A single transport task owns the socket. It frames packets with the
//! [`shared::PeerLink`] reliability layer: reliable packets are retransmitted
//! until acknowledged, movement is sequenced, stats and heartbeats are fire
//! and forget.
//!
//! ### Tick Loops
//! Independent loops run alongside the sessions:
//! - Stats decay (~1 s): hunger, thirst, starvation and temperature
//! - Stats sync (~2 s): `StatsUpdate` to each player
//! - Resource regen (~10 s): destroyed nodes come back
//! - Crafting (~0.5 s): finished items are handed out
//! - Combat upkeep (~0.1 s): reloads complete, combat flags expire
//! - Liveness (~5 s): silent players are disconnected
//!
//! ## Module Organization
//!
//! - [`network`]: server core, event poll loop and tick loop scheduling
//! - [`transport`]: socket task and per-peer reliability state
//! - [`session`] / [`handlers`]: per-client state machine and gameplay packets
//! - [`context`]: shared state, session directory and fan-out helpers
//! - [`player`] / [`inventory`]: player registry and slot inventory
//! - [`resources`]: resource ledger (nodes, gathering, respawn)
//! - [`crafting`]: recipe catalogue and per-player crafting queues
//! - [`combat`]: damage model, weapons and attack resolution
//! - [`ticks`]: one pass of each periodic loop
//! - [`persistence`]: player snapshot store
//! - [`config`] / [`error`]: tunables and the error taxonomy
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:7777".to_string(),
//!         world_seed: Some(42),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binds the socket and generates the resource nodes
//!     let server = Server::bind(config).await?;
//!
//!     // Runs the transport, the session router and every tick loop
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod combat;
pub mod config;
pub mod context;
pub mod crafting;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod network;
pub mod persistence;
pub mod player;
pub mod resources;
pub mod session;
pub mod ticks;
pub mod transport;

pub use config::{RefundPolicy, ServerConfig};
pub use error::{Result, ServerError};
pub use network::Server;
