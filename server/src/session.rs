//! Per-peer connection state machine
//!
//! ```text
//! Connecting --ConnectionRequest--> AwaitingReady --ClientReady--> Syncing --> Active
//!      \                                 |                             |          |
//!       `---------------------------- Disconnected <-------------------+----------'
//! ```
//!
//! Every session runs as its own task fed by an unbounded channel, so the
//! packets of one peer are handled strictly in arrival order while different
//! peers proceed independently.

use crate::context::ServerContext;
use crate::crafting;
use crate::error::{Result, ServerError};
use crate::inventory::Inventory;
use bytes::Bytes;
use log::{debug, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::sleep;

const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingReady,
    Syncing,
    Active,
    Disconnected,
}

pub struct Session {
    pub(crate) addr: SocketAddr,
    pub(crate) state: SessionState,
    pub(crate) player_id: Option<u32>,
    pub(crate) ctx: Arc<ServerContext>,
}

impl Session {
    pub fn new(addr: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        Self {
            addr,
            state: SessionState::Connecting,
            player_id: None,
            ctx,
        }
    }

    /// Starts the session task and returns its work queue
    pub fn spawn(addr: SocketAddr, ctx: Arc<ServerContext>) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Session::new(addr, ctx).run(rx));
        tx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    /// Processes queued datagrams until the session ends or its queue is dropped
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Bytes>) {
        while let Some(datagram) = rx.recv().await {
            self.handle_datagram(&datagram).await;
            if self.state == SessionState::Disconnected {
                break;
            }
        }
        self.state = SessionState::Disconnected;
        debug!("Session {} finished", self.addr);
    }

    /// Decodes and dispatches one envelope. Failures are logged, never fatal.
    pub async fn handle_datagram(&mut self, datagram: &[u8]) {
        match Packet::decode(datagram) {
            Ok(Some(packet)) => {
                if let Err(e) = self.handle_packet(packet).await {
                    warn!("Session {} ({:?}): {}", self.addr, self.player_id, e);
                }
            }
            Ok(None) => debug!("Ignoring unknown packet type from {}", self.addr),
            Err(e) => warn!("Malformed packet from {}: {}", self.addr, e),
        }
    }

    pub async fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        match (self.state, packet) {
            (SessionState::Disconnected, _) => Ok(()),
            (
                SessionState::Connecting,
                Packet::ConnectionRequest {
                    player_name,
                    client_version,
                },
            ) => self.handshake(player_name, client_version).await,
            (_, Packet::ConnectionRequest { .. }) => {
                debug!("Ignoring repeated ConnectionRequest from {}", self.addr);
                Ok(())
            }
            (SessionState::AwaitingReady, Packet::ClientReady) => self.sync().await,
            (_, Packet::ClientReady) => {
                debug!("Ignoring repeated ClientReady from {}", self.addr);
                Ok(())
            }
            (_, Packet::PlayerDisconnect { .. }) => {
                self.disconnect("Client disconnected").await;
                Ok(())
            }
            (_, Packet::Heartbeat { .. }) => {
                self.touch().await;
                Ok(())
            }
            (SessionState::Active, packet) => self.handle_gameplay(packet).await,
            (state, packet) => Err(ServerError::invalid_state(format!(
                "{:?} not accepted while {:?}",
                packet.packet_type(),
                state
            ))),
        }
    }

    async fn touch(&self) {
        if let Some(id) = self.player_id {
            let mut players = self.ctx.players.write().await;
            if let Some(player) = players.get_mut(id) {
                player.last_heartbeat = Instant::now();
            }
        }
    }

    async fn reject(&mut self, reason: String) -> Result<()> {
        info!("Rejecting {}: {}", self.addr, reason);
        self.ctx
            .send_to_addr(self.addr, Packet::ConnectionReject { reason });
        self.state = SessionState::Disconnected;
        self.ctx.close_peer(self.addr).await;
        Ok(())
    }

    async fn handshake(&mut self, name: String, client_version: u32) -> Result<()> {
        if client_version != PROTOCOL_VERSION {
            return self
                .reject(format!(
                    "Version mismatch: server {}, client {}",
                    PROTOCOL_VERSION, client_version
                ))
                .await;
        }
        let name = name.trim().to_string();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return self.reject("Invalid name".to_string()).await;
        }

        let spawn = self.ctx.spawn_point();
        let added = {
            let mut players = self.ctx.players.write().await;
            players.add(&name, spawn)
        };
        let player_id = match added {
            Ok(id) => id,
            Err(ServerError::InvalidState(reason)) => return self.reject(reason).await,
            Err(e) => return Err(e),
        };

        match self.ctx.store.load(player_id) {
            Ok(Some(saved)) => {
                let mut players = self.ctx.players.write().await;
                if let Some(player) = players.get_mut(player_id) {
                    player.inventory = Inventory::from_slots(&saved.inventory);
                    // A player who logged out dead comes back fresh
                    if saved.stats.health > 0.0 {
                        player.stats = saved.stats;
                    }
                }
                debug!("Restored saved state of player {}", player_id);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load player {}: {}", player_id, e),
        }

        self.ctx.crafting.lock().await.add_player(player_id);
        {
            let mut sessions = self.ctx.sessions.write().await;
            sessions.bind(self.addr, player_id);
        }

        self.player_id = Some(player_id);
        self.state = SessionState::AwaitingReady;
        self.ctx
            .send_to_addr(self.addr, Packet::ConnectionAccept { player_id, spawn });
        info!("{} joined as player {} from {}", name, player_id, self.addr);
        Ok(())
    }

    /// Streams the world to a freshly accepted client, then activates it
    async fn sync(&mut self) -> Result<()> {
        let player_id = self.require_player()?;
        self.state = SessionState::Syncing;
        let step = self.ctx.config.sync_step_delay;

        let (inventory, own_spawn, stats) = {
            let players = self.ctx.players.read().await;
            let player = players
                .get(player_id)
                .ok_or_else(|| ServerError::unknown_player(player_id))?;
            (
                player.inventory_packet(),
                player.spawn_packet(),
                player.stats_packet(),
            )
        };
        self.ctx.send_to_addr(self.addr, inventory);
        sleep(step).await;

        let others: Vec<Packet> = {
            let players = self.ctx.players.read().await;
            players
                .iter()
                .filter(|p| p.id != player_id)
                .map(|p| p.spawn_packet())
                .collect()
        };
        for spawn in others {
            self.ctx.send_to_addr(self.addr, spawn);
        }
        sleep(step).await;

        let nodes = {
            let resources = self.ctx.resources.read().await;
            resources.list().iter().map(|n| n.to_data()).collect()
        };
        self.ctx
            .send_to_addr(self.addr, Packet::ResourcesSync { nodes });
        sleep(step).await;

        self.ctx.send_to_addr(
            self.addr,
            Packet::RecipesSync {
                recipes: crafting::recipe_data(),
            },
        );
        sleep(step).await;

        self.ctx.broadcast(own_spawn, Some(player_id)).await;
        self.ctx.send_to_addr(self.addr, stats);

        {
            let mut sessions = self.ctx.sessions.write().await;
            sessions.activate(self.addr);
        }
        self.state = SessionState::Active;
        info!("Player {} is in game", player_id);
        Ok(())
    }

    pub(crate) fn require_player(&self) -> Result<u32> {
        self.player_id
            .ok_or_else(|| ServerError::invalid_state("session has no player"))
    }

    pub async fn disconnect(&mut self, reason: &str) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnected;
        match self.player_id {
            Some(id) => {
                self.ctx.disconnect_player(id, reason).await;
            }
            None => self.ctx.close_peer(self.addr).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::persistence::MemoryStore;
    use crate::transport::TransportCommand;
    use std::time::Duration;

    fn context() -> (Arc<ServerContext>, mpsc::UnboundedReceiver<TransportCommand>) {
        let config = ServerConfig {
            sync_step_delay: Duration::ZERO,
            nodes_per_type: 1,
            world_seed: Some(3),
            ..ServerConfig::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(ServerContext::new(config, Arc::new(MemoryStore::new()), tx)),
            rx,
        )
    }

    /// Packets sent to one peer, in order
    fn drain(rx: &mut mpsc::UnboundedReceiver<TransportCommand>) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Ok(command) = rx.try_recv() {
            match command {
                TransportCommand::Send { packet, .. } => out.push(packet),
                TransportCommand::Broadcast { packet, .. } => out.push(packet),
                TransportCommand::Drop { .. } => {}
            }
        }
        out
    }

    async fn connected(ctx: &Arc<ServerContext>, port: u16, name: &str) -> Session {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let (tx, _rx) = mpsc::unbounded_channel();
        ctx.sessions.write().await.insert(addr, tx);
        let mut session = Session::new(addr, Arc::clone(ctx));
        session
            .handle_packet(Packet::ConnectionRequest {
                player_name: name.to_string(),
                client_version: PROTOCOL_VERSION,
            })
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_handshake_accepts() {
        let (ctx, mut rx) = context();
        let session = connected(&ctx, 4000, "alice").await;

        assert_eq!(session.state(), SessionState::AwaitingReady);
        let id = session.player_id().unwrap();
        assert!(ctx.players.read().await.contains(id));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Packet::ConnectionAccept { player_id, .. }] if *player_id == id
        ));
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let (ctx, mut rx) = context();
        let mut session = Session::new(SocketAddr::from(([127, 0, 0, 1], 4001)), Arc::clone(&ctx));
        session
            .handle_packet(Packet::ConnectionRequest {
                player_name: "bob".into(),
                client_version: PROTOCOL_VERSION + 1,
            })
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(ctx.players.read().await.is_empty());
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Packet::ConnectionReject { .. }]
        ));
    }

    #[tokio::test]
    async fn test_sync_order_and_replay_guard() {
        let (ctx, mut rx) = context();
        let _other = connected(&ctx, 4002, "carol").await;
        let mut session = connected(&ctx, 4003, "dave").await;
        drain(&mut rx);

        session.handle_packet(Packet::ClientReady).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);

        let sent = drain(&mut rx);
        let kinds: Vec<_> = sent.iter().map(|p| p.packet_type()).collect();
        use shared::PacketType::*;
        assert_eq!(
            kinds,
            vec![InventoryUpdate, PlayerSpawn, ResourcesSync, RecipesSync, StatsUpdate]
        );

        // A second ClientReady does not resend the world
        session.handle_packet(Packet::ClientReady).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_gameplay_before_ready_is_refused() {
        let (ctx, _rx) = context();
        let mut session = connected(&ctx, 4004, "erin").await;
        let result = session
            .handle_packet(Packet::ItemMove { from: 0, to: 1 })
            .await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::AwaitingReady);
    }

    #[tokio::test]
    async fn test_malformed_datagram_keeps_session() {
        let (ctx, _rx) = context();
        let mut session = connected(&ctx, 4005, "frank").await;
        session.handle_datagram(&[6, 200, 0, 0, 0]).await;
        session.handle_datagram(&[250, 0, 0, 0, 0]).await;
        assert_eq!(session.state(), SessionState::AwaitingReady);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (ctx, _rx) = context();
        let mut session = connected(&ctx, 4006, "gina").await;
        let id = session.player_id().unwrap();

        session
            .handle_packet(Packet::PlayerDisconnect {
                player_id: id,
                reason: "bye".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        session.disconnect("again").await;

        assert!(!ctx.players.read().await.contains(id));
        assert!(ctx.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_restores_inventory() {
        let (ctx, _rx) = context();
        let mut session = connected(&ctx, 4007, "hank").await;
        let id = session.player_id().unwrap();
        ctx.players
            .write()
            .await
            .get_mut(id)
            .unwrap()
            .inventory
            .add(shared::items::ids::WOOD, 77);
        session.disconnect("bye").await;

        let again = connected(&ctx, 4008, "hank").await;
        assert_eq!(again.player_id(), Some(id));
        let players = ctx.players.read().await;
        assert_eq!(players.get(id).unwrap().inventory.count(shared::items::ids::WOOD), 77);
    }
}
