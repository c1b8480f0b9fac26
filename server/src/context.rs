//! Shared server state
//!
//! [`ServerContext`] is handed to every session task and tick loop. Locks are
//! always taken in the order players, resources, crafting, combat. The
//! sessions lock is never held together with any other, and no guard is ever
//! held across a send or a sleep.

use crate::combat::CombatResolver;
use crate::config::ServerConfig;
use crate::crafting::CraftingQueue;
use crate::persistence::PlayerStore;
use crate::player::PlayerRegistry;
use crate::resources::ResourceLedger;
use crate::transport::TransportCommand;
use bytes::Bytes;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Packet, Vec3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

#[derive(Debug)]
pub struct SessionEntry {
    /// Ordered work queue of the session task
    pub tx: mpsc::UnboundedSender<Bytes>,
    pub player_id: Option<u32>,
    pub active: bool,
}

/// Peer address to session mapping, plus the reverse player lookup
#[derive(Debug, Default)]
pub struct SessionDirectory {
    by_addr: HashMap<SocketAddr, SessionEntry>,
    by_player: HashMap<u32, SocketAddr>,
}

impl SessionDirectory {
    pub fn insert(&mut self, addr: SocketAddr, tx: mpsc::UnboundedSender<Bytes>) {
        self.by_addr.insert(
            addr,
            SessionEntry {
                tx,
                player_id: None,
                active: false,
            },
        );
    }

    pub fn bind(&mut self, addr: SocketAddr, player_id: u32) {
        if let Some(entry) = self.by_addr.get_mut(&addr) {
            entry.player_id = Some(player_id);
            self.by_player.insert(player_id, addr);
        }
    }

    pub fn activate(&mut self, addr: SocketAddr) {
        if let Some(entry) = self.by_addr.get_mut(&addr) {
            entry.active = true;
        }
    }

    pub fn remove(&mut self, addr: SocketAddr) -> Option<SessionEntry> {
        let entry = self.by_addr.remove(&addr)?;
        if let Some(player_id) = entry.player_id {
            self.by_player.remove(&player_id);
        }
        Some(entry)
    }

    pub fn remove_player(&mut self, player_id: u32) -> Option<SocketAddr> {
        let addr = self.by_player.remove(&player_id)?;
        self.by_addr.remove(&addr);
        Some(addr)
    }

    pub fn sender(&self, addr: SocketAddr) -> Option<mpsc::UnboundedSender<Bytes>> {
        self.by_addr.get(&addr).map(|entry| entry.tx.clone())
    }

    pub fn addr_of(&self, player_id: u32) -> Option<SocketAddr> {
        self.by_player.get(&player_id).copied()
    }

    /// Addresses of fully synced sessions, minus `exclude`'s own
    pub fn active_addrs(&self, exclude: Option<u32>) -> Vec<SocketAddr> {
        self.by_addr
            .iter()
            .filter(|(_, entry)| entry.active && (exclude.is_none() || entry.player_id != exclude))
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

pub struct ServerContext {
    pub config: ServerConfig,
    pub players: RwLock<PlayerRegistry>,
    pub sessions: RwLock<SessionDirectory>,
    pub resources: RwLock<ResourceLedger>,
    pub crafting: Mutex<CraftingQueue>,
    pub combat: Mutex<CombatResolver>,
    pub store: Arc<dyn PlayerStore>,
    transport: mpsc::UnboundedSender<TransportCommand>,
}

impl ServerContext {
    /// Builds the shared state and populates the world
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn PlayerStore>,
        transport: mpsc::UnboundedSender<TransportCommand>,
    ) -> Self {
        let mut rng = match config.world_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut resources = ResourceLedger::new(config.resource_respawn_delay);
        resources.generate(&config, &mut rng);

        Self {
            players: RwLock::new(PlayerRegistry::new(config.max_players)),
            sessions: RwLock::new(SessionDirectory::default()),
            resources: RwLock::new(resources),
            crafting: Mutex::new(CraftingQueue::new(
                config.crafting_queue_cap,
                config.max_craft_amount,
                config.refund_policy,
            )),
            combat: Mutex::new(CombatResolver::new(&config)),
            store,
            transport,
            config,
        }
    }

    fn command(&self, command: TransportCommand) {
        if let Err(e) = self.transport.send(command) {
            error!("Failed to queue transport command: {}", e);
        }
    }

    pub fn send_to_addr(&self, addr: SocketAddr, packet: Packet) {
        self.command(TransportCommand::Send { addr, packet });
    }

    pub async fn send_to_player(&self, player_id: u32, packet: Packet) {
        let addr = {
            let sessions = self.sessions.read().await;
            sessions.addr_of(player_id)
        };
        match addr {
            Some(addr) => self.send_to_addr(addr, packet),
            None => warn!("No session for player {}", player_id),
        }
    }

    /// Sends to every active session except `exclude`'s
    pub async fn broadcast(&self, packet: Packet, exclude: Option<u32>) {
        let addrs = {
            let sessions = self.sessions.read().await;
            sessions.active_addrs(exclude)
        };
        if !addrs.is_empty() {
            self.command(TransportCommand::Broadcast { addrs, packet });
        }
    }

    /// Random point within the spawn radius
    pub fn spawn_point(&self) -> Vec3 {
        let radius = self.config.spawn_radius;
        let centre = self.config.spawn_point;
        if radius <= 0.0 {
            return centre;
        }
        let mut rng = rand::thread_rng();
        Vec3::new(
            centre.x + rng.gen_range(-radius..radius),
            centre.y,
            centre.z + rng.gen_range(-radius..radius),
        )
    }

    /// Removes a player and everything hanging off it
    ///
    /// Safe to call from several paths at once; only the first call finds the
    /// player and does the work.
    pub async fn disconnect_player(&self, player_id: u32, reason: &str) -> bool {
        let removed = {
            let mut players = self.players.write().await;
            players.remove(player_id)
        };
        let Some(player) = removed else {
            return false;
        };

        self.crafting.lock().await.clear(player_id);

        if let Err(e) = self.store.save(player_id, &player.inventory, &player.stats) {
            error!("Failed to save player {}: {}", player_id, e);
        }

        let addr = {
            let mut sessions = self.sessions.write().await;
            sessions.remove_player(player_id)
        };

        let notice = Packet::PlayerDisconnect {
            player_id,
            reason: reason.to_string(),
        };
        if let Some(addr) = addr {
            self.send_to_addr(addr, notice.clone());
            self.command(TransportCommand::Drop { addr });
        }
        self.broadcast(notice, Some(player_id)).await;

        info!("Player {} disconnected: {}", player_id, reason);
        true
    }

    /// Forgets a peer that never got as far as owning a player
    pub async fn close_peer(&self, addr: SocketAddr) {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(addr);
        }
        self.command(TransportCommand::Drop { addr });
    }

    /// Handles a peer the transport gave up on
    pub async fn drop_session(&self, addr: SocketAddr, reason: &str) {
        let entry = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(addr)
        };
        if let Some(player_id) = entry.and_then(|entry| entry.player_id) {
            self.disconnect_player(player_id, reason).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    pub(crate) fn test_context() -> (Arc<ServerContext>, mpsc::UnboundedReceiver<TransportCommand>) {
        let config = ServerConfig {
            world_seed: Some(1),
            nodes_per_type: 2,
            ..ServerConfig::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ServerContext::new(config, Arc::new(MemoryStore::new()), tx);
        (Arc::new(ctx), rx)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_directory_binding() {
        let mut directory = SessionDirectory::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        directory.insert(addr(1000), tx.clone());
        directory.insert(addr(1001), tx);

        directory.bind(addr(1000), 5);
        directory.activate(addr(1000));
        directory.bind(addr(1001), 6);

        assert_eq!(directory.addr_of(5), Some(addr(1000)));
        assert_eq!(directory.addr_of(6), Some(addr(1001)));
        // Only synced sessions receive broadcasts
        assert_eq!(directory.active_addrs(None), vec![addr(1000)]);
        assert!(directory.active_addrs(Some(5)).is_empty());

        assert_eq!(directory.remove_player(5), Some(addr(1000)));
        assert_eq!(directory.len(), 1);
        assert!(directory.remove(addr(1001)).is_some());
        assert!(directory.addr_of(6).is_none());
    }

    #[tokio::test]
    async fn test_world_is_generated() {
        let (ctx, _rx) = test_context();
        assert_eq!(ctx.resources.read().await.len(), 8);
    }

    #[tokio::test]
    async fn test_spawn_point_within_radius() {
        let (ctx, _rx) = test_context();
        for _ in 0..20 {
            let point = ctx.spawn_point();
            assert!(point.distance(&ctx.config.spawn_point) <= ctx.config.spawn_radius * 1.5);
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_saves() {
        let (ctx, mut rx) = test_context();
        let id = ctx.players.write().await.add("alice", Vec3::ZERO).unwrap();
        let (tx, _session_rx) = mpsc::unbounded_channel();
        {
            let mut sessions = ctx.sessions.write().await;
            sessions.insert(addr(2000), tx);
            sessions.bind(addr(2000), id);
            sessions.activate(addr(2000));
        }

        assert!(ctx.disconnect_player(id, "Timed out").await);
        assert!(!ctx.disconnect_player(id, "Timed out").await);

        assert!(ctx.players.read().await.get(id).is_none());
        assert!(ctx.sessions.read().await.is_empty());
        assert!(ctx.store.load(id).unwrap().is_some());

        match rx.recv().await {
            Some(TransportCommand::Send { addr: to, packet }) => {
                assert_eq!(to, addr(2000));
                assert!(matches!(packet, Packet::PlayerDisconnect { .. }));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(TransportCommand::Drop { .. })));
    }

    #[tokio::test]
    async fn test_broadcast_skips_excluded_and_inactive() {
        let (ctx, mut rx) = test_context();
        let (tx, _session_rx) = mpsc::unbounded_channel();
        {
            let mut sessions = ctx.sessions.write().await;
            sessions.insert(addr(3000), tx.clone());
            sessions.bind(addr(3000), 1);
            sessions.activate(addr(3000));
            sessions.insert(addr(3001), tx);
            sessions.bind(addr(3001), 2);
        }

        ctx.broadcast(Packet::ClientReady, Some(1)).await;
        ctx.broadcast(Packet::ClientReady, None).await;

        match rx.recv().await {
            Some(TransportCommand::Broadcast { addrs, .. }) => assert_eq!(addrs, vec![addr(3000)]),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
