//! Headless bot that joins a server, walks in a circle and gathers whatever
//! node is closest. Handy for poking at a running server by hand.

use clap::Parser;
use log::{debug, info, warn};
use shared::{NodeData, Packet, PeerLink, Vec3, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::interval;

const RESEND_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_RESEND_ATTEMPTS: u32 = 10;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    server: SocketAddr,
    /// Player name to join with
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Seconds to stay connected
    #[clap(short, long, default_value = "30")]
    duration: u64,
}

// Current timestamp in milliseconds
fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

struct Bot {
    socket: UdpSocket,
    server: SocketAddr,
    link: PeerLink,
    player_id: Option<u32>,
    position: Vec3,
    nodes: Vec<NodeData>,
}

impl Bot {
    async fn send(&mut self, packet: &Packet) -> std::io::Result<()> {
        let frame = self
            .link
            .wrap(packet.delivery(), &packet.to_bytes(), Instant::now());
        self.socket.send_to(&frame, self.server).await?;
        Ok(())
    }

    /// Returns false once the server has turned us away
    async fn on_datagram(&mut self, datagram: &[u8]) -> Result<bool, Box<dyn std::error::Error>> {
        let incoming = self.link.receive(datagram, Instant::now())?;
        if let Some(ack) = incoming.ack {
            self.socket.send_to(&ack, self.server).await?;
        }

        for body in incoming.delivered {
            let Some(packet) = Packet::decode(&body)? else {
                continue;
            };
            match packet {
                Packet::ConnectionAccept { player_id, spawn } => {
                    info!("Joined as player {} at {:?}", player_id, spawn);
                    self.player_id = Some(player_id);
                    self.position = spawn;
                    self.send(&Packet::ClientReady).await?;
                }
                Packet::ConnectionReject { reason } => {
                    warn!("Connection rejected: {}", reason);
                    return Ok(false);
                }
                Packet::ResourcesSync { nodes } => {
                    info!("World has {} resource nodes", nodes.len());
                    self.nodes = nodes;
                }
                Packet::GatherResult {
                    wood,
                    stone,
                    metal_ore,
                    sulfur_ore,
                    ..
                } => info!(
                    "Gathered wood {} stone {} metal {} sulfur {}",
                    wood, stone, metal_ore, sulfur_ore
                ),
                Packet::PlayerDisconnect { player_id, reason } if Some(player_id) == self.player_id => {
                    warn!("Disconnected by server: {}", reason);
                    return Ok(false);
                }
                other => debug!("Received {:?}", other.packet_type()),
            }
        }
        Ok(true)
    }

    /// One step around the circle, plus a swing at the nearest node
    async fn wander(&mut self, step: u32) -> std::io::Result<()> {
        let Some(player_id) = self.player_id else {
            return Ok(());
        };
        let angle = step as f32 / 10.0;
        self.position.x += angle.cos();
        self.position.z += angle.sin();
        self.send(&Packet::PlayerMovement {
            player_id,
            position: self.position,
            yaw: angle,
            pitch: 0.0,
        })
        .await?;

        let nearest = self
            .nodes
            .iter()
            .filter(|node| node.alive)
            .min_by(|a, b| {
                a.position
                    .distance(&self.position)
                    .total_cmp(&b.position.distance(&self.position))
            })
            .map(|node| node.node_id);
        if let Some(node_id) = nearest {
            self.send(&Packet::ResourceHit {
                node_id,
                tool_item_id: 0,
            })
            .await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    let mut bot = Bot {
        socket,
        server: args.server,
        link: PeerLink::new(Instant::now()),
        player_id: None,
        position: Vec3::ZERO,
        nodes: Vec::new(),
    };
    bot.send(&Packet::ConnectionRequest {
        player_name: args.name.clone(),
        client_version: PROTOCOL_VERSION,
    })
    .await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut heartbeat = interval(Duration::from_secs(1));
    let mut resend = interval(RESEND_TIMEOUT);
    let mut buf = vec![0u8; 65_536];
    let mut step = 0;

    while Instant::now() < deadline {
        tokio::select! {
            received = bot.socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                if !bot.on_datagram(&buf[..len]).await? {
                    return Ok(());
                }
            }
            _ = heartbeat.tick() => {
                bot.send(&Packet::Heartbeat { timestamp: timestamp() }).await?;
                bot.wander(step).await?;
                step += 1;
            }
            _ = resend.tick() => {
                for frame in bot.link.resend_due(Instant::now(), RESEND_TIMEOUT, MAX_RESEND_ATTEMPTS)? {
                    bot.socket.send_to(&frame, bot.server).await?;
                }
            }
        }
    }

    if let Some(player_id) = bot.player_id {
        bot.send(&Packet::PlayerDisconnect {
            player_id,
            reason: "Test client finished".to_string(),
        })
        .await?;
    }
    info!("Test client finished");
    Ok(())
}
