//! UDP transport task
//!
//! One task owns the socket and the per-peer [`PeerLink`] state. Everything
//! else talks to it through channels: inbound datagrams come out as
//! [`TransportEvent`]s, outbound packets go in as [`TransportCommand`]s. Being
//! the only writer, it also owns the scratch buffer used for encoding.

use crate::config::ServerConfig;
use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use shared::{Packet, PeerLink};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug)]
pub enum TransportEvent {
    Connected(SocketAddr),
    Received(SocketAddr, Bytes),
    Disconnected(SocketAddr),
}

#[derive(Debug)]
pub enum TransportCommand {
    Send { addr: SocketAddr, packet: Packet },
    Broadcast { addrs: Vec<SocketAddr>, packet: Packet },
    /// Forget a peer; anything still unacknowledged is abandoned
    Drop { addr: SocketAddr },
}

pub struct Transport {
    socket: UdpSocket,
    peers: HashMap<SocketAddr, PeerLink>,
    scratch: BytesMut,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    resend_timeout: Duration,
    max_attempts: u32,
    idle_timeout: Duration,
}

impl Transport {
    pub fn new(
        socket: UdpSocket,
        config: &ServerConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
        commands: mpsc::UnboundedReceiver<TransportCommand>,
    ) -> Self {
        Self {
            socket,
            peers: HashMap::new(),
            scratch: BytesMut::with_capacity(1024),
            events,
            commands,
            resend_timeout: config.resend_timeout,
            max_attempts: config.max_resend_attempts,
            idle_timeout: config.peer_idle_timeout,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs until every command sender is gone
    pub async fn run(mut self) {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let mut maintenance = interval(self.resend_timeout / 2);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, addr)) => self.on_datagram(addr, &buffer[..len]).await,
                        // ICMP port unreachable surfaces here on some platforms
                        Err(e) => warn!("Error receiving datagram: {}", e),
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.on_command(command).await,
                        None => {
                            info!("Transport shutting down");
                            break;
                        }
                    }
                }
                _ = maintenance.tick() => self.maintain().await,
            }
        }
    }

    async fn on_datagram(&mut self, addr: SocketAddr, datagram: &[u8]) {
        let now = Instant::now();

        if !self.peers.contains_key(&addr) {
            self.peers.insert(addr, PeerLink::new(now));
            debug!("New peer {}", addr);
            self.emit(TransportEvent::Connected(addr));
        }

        let incoming = match self.peers.get_mut(&addr).map(|link| link.receive(datagram, now)) {
            Some(Ok(incoming)) => incoming,
            Some(Err(e)) => {
                warn!("Dropping frame from {}: {}", addr, e);
                return;
            }
            None => return,
        };

        if let Some(ack) = incoming.ack {
            self.send_raw(&ack, addr).await;
        }
        for body in incoming.delivered {
            self.emit(TransportEvent::Received(addr, body));
        }
    }

    async fn on_command(&mut self, command: TransportCommand) {
        let now = Instant::now();
        match command {
            TransportCommand::Send { addr, packet } => {
                let body = packet.encode_with(&mut self.scratch);
                let Some(link) = self.peers.get_mut(&addr) else {
                    debug!("Dropping {:?} for unknown peer {}", packet.packet_type(), addr);
                    return;
                };
                let frame = link.wrap(packet.delivery(), &body, now);
                self.send_raw(&frame, addr).await;
            }
            TransportCommand::Broadcast { addrs, packet } => {
                let body = packet.encode_with(&mut self.scratch);
                let delivery = packet.delivery();
                for addr in addrs {
                    let Some(link) = self.peers.get_mut(&addr) else {
                        continue;
                    };
                    let frame = link.wrap(delivery, &body, now);
                    self.send_raw(&frame, addr).await;
                }
            }
            TransportCommand::Drop { addr } => {
                if self.peers.remove(&addr).is_some() {
                    debug!("Dropped peer {}", addr);
                }
            }
        }
    }

    /// Retransmits overdue reliable frames and reaps dead peers
    async fn maintain(&mut self) {
        let now = Instant::now();
        let mut resends = Vec::new();
        let mut dead = Vec::new();

        for (addr, link) in self.peers.iter_mut() {
            if link.idle_for(now) > self.idle_timeout {
                info!("Peer {} idle for {:?}", addr, link.idle_for(now));
                dead.push(*addr);
                continue;
            }
            match link.resend_due(now, self.resend_timeout, self.max_attempts) {
                Ok(frames) => resends.extend(frames.into_iter().map(|frame| (*addr, frame))),
                Err(e) => {
                    warn!("Peer {} unreachable: {}", addr, e);
                    dead.push(*addr);
                }
            }
        }

        for addr in dead {
            self.peers.remove(&addr);
            self.emit(TransportEvent::Disconnected(addr));
        }
        for (addr, frame) in resends {
            self.send_raw(&frame, addr).await;
        }
    }

    async fn send_raw(&self, frame: &[u8], addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(frame, addr).await {
            error!("Failed to send to {}: {}", addr, e);
        }
    }

    fn emit(&self, event: TransportEvent) {
        if let Err(e) = self.events.send(event) {
            error!("Failed to forward transport event: {}", e);
        }
    }
}
