//! Server core: transport, tick loops and the event poll loop

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::error::Result;
use crate::persistence::{MemoryStore, PlayerStore};
use crate::session::Session;
use crate::ticks;
use crate::transport::{Transport, TransportEvent};
use bytes::Bytes;
use log::{debug, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Aborts the background tasks it owns when dropped
struct TaskSet(Vec<JoinHandle<()>>);

impl Drop for TaskSet {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

pub struct Server {
    ctx: Arc<ServerContext>,
    transport: Transport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the socket and builds the world, keeping player data in memory
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_store(config, Arc::new(MemoryStore::new())).await
    }

    pub async fn bind_with_store(config: ServerConfig, store: Arc<dyn PlayerStore>) -> Result<Self> {
        let socket = UdpSocket::bind(&config.bind_addr).await?;
        let local_addr = socket.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (event_tx, events) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(socket, &config, event_tx, command_rx);
        let ctx = Arc::new(ServerContext::new(config, store, command_tx));
        info!(
            "World ready with {} resource nodes",
            ctx.resources.read().await.len()
        );

        Ok(Self {
            ctx,
            transport,
            events,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    /// Runs until the transport task stops
    pub async fn run(self) -> Result<()> {
        let Server {
            ctx,
            transport,
            mut events,
            ..
        } = self;

        let mut tasks = vec![tokio::spawn(transport.run())];
        tasks.extend(spawn_tick_loops(&ctx));
        let _tasks = TaskSet(tasks);
        info!("Server started successfully");

        let mut poll = interval(ctx.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            poll.tick().await;
            loop {
                match events.try_recv() {
                    Ok(event) => dispatch(&ctx, event).await,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!("Transport stopped, shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Routes one transport event to the session owning the peer
async fn dispatch(ctx: &Arc<ServerContext>, event: TransportEvent) {
    match event {
        TransportEvent::Connected(addr) => {
            open_session(ctx, addr).await;
        }
        TransportEvent::Received(addr, body) => {
            let existing = ctx.sessions.read().await.sender(addr);
            let sender = match existing {
                Some(sender) => sender,
                None => open_session(ctx, addr).await,
            };
            if sender.send(body).is_err() {
                debug!("Session for {} already finished", addr);
                ctx.drop_session(addr, "Connection lost").await;
            }
        }
        TransportEvent::Disconnected(addr) => {
            ctx.drop_session(addr, "Connection lost").await;
        }
    }
}

async fn open_session(ctx: &Arc<ServerContext>, addr: SocketAddr) -> mpsc::UnboundedSender<Bytes> {
    let tx = Session::spawn(addr, Arc::clone(ctx));
    ctx.sessions.write().await.insert(addr, tx.clone());
    debug!("Opened session for {}", addr);
    tx
}

fn spawn_tick_loops(ctx: &Arc<ServerContext>) -> Vec<JoinHandle<()>> {
    let config = &ctx.config;
    vec![
        spawn_ticker(ctx, "stats decay", config.stats_decay_interval, |ctx, dt, _| async move {
            ticks::decay_stats(&ctx, dt.as_secs_f32()).await;
        }),
        spawn_ticker(ctx, "stats sync", config.stats_sync_interval, |ctx, _, _| async move {
            ticks::sync_stats(&ctx).await;
        }),
        spawn_ticker(ctx, "resource regen", config.resource_regen_interval, |ctx, _, now| async move {
            ticks::regen_resources(&ctx, now).await;
        }),
        spawn_ticker(ctx, "crafting", config.crafting_interval, |ctx, dt, _| async move {
            ticks::progress_crafting(&ctx, dt.as_secs_f32()).await;
        }),
        spawn_ticker(ctx, "combat", config.combat_interval, |ctx, _, now| async move {
            ticks::combat_upkeep(&ctx, now).await;
        }),
        spawn_ticker(ctx, "liveness", config.liveness_interval, |ctx, _, now| async move {
            ticks::sweep_liveness(&ctx, now).await;
        }),
    ]
}

/// Calls `work` every `period` with the real time elapsed since the last call
fn spawn_ticker<F, Fut>(
    ctx: &Arc<ServerContext>,
    name: &'static str,
    period: Duration,
    mut work: F,
) -> JoinHandle<()>
where
    F: FnMut(Arc<ServerContext>, Duration, Instant) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;
        debug!("{} loop running every {:?}", name, period);

        let mut last = Instant::now();
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last);
            last = now;
            work(Arc::clone(&ctx), elapsed, now).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            nodes_per_type: 3,
            ..ServerConfig::default()
        };
        let server = Server::bind(config).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.context().resources.read().await.len(), 12);
    }

    #[tokio::test]
    async fn test_connect_opens_and_disconnect_closes_session() {
        let (ctx, _rx) = test_context();

        dispatch(&ctx, TransportEvent::Connected(addr(7000))).await;
        assert!(ctx.sessions.read().await.sender(addr(7000)).is_some());

        dispatch(&ctx, TransportEvent::Disconnected(addr(7000))).await;
        assert!(ctx.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_datagram_from_unknown_peer_opens_session() {
        let (ctx, _rx) = test_context();
        let body = shared::Packet::Heartbeat { timestamp: 1 }.to_bytes();

        dispatch(&ctx, TransportEvent::Received(addr(7001), body)).await;
        assert_eq!(ctx.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ticker_reports_elapsed_time() {
        let (ctx, _rx) = test_context();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = spawn_ticker(&ctx, "test", Duration::from_millis(10), move |_, dt, _| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(dt);
            }
        });

        let first = rx.recv().await.unwrap();
        assert!(first >= Duration::from_millis(5));
        task.abort();
    }
}
