//! Per-peer delivery channels over raw UDP datagrams
//!
//! Each datagram carries a frame header `[kind:u8][seq:u32 LE]` in front of a
//! packet envelope. Three delivery classes share one socket:
//!
//! - **Reliable** frames are numbered, acknowledged and retransmitted until
//!   acknowledged; the receiver buffers early arrivals and releases them in
//!   order.
//! - **Sequenced** frames are numbered; anything older than the newest seen
//!   frame is dropped.
//! - **Unreliable** frames are passed straight through.

use crate::codec::CodecError;
use crate::packets::Delivery;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 5;

/// Reliable frames further ahead than this are dropped instead of buffered
pub const REORDER_WINDOW: u32 = 256;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Unreliable = 0,
    Sequenced = 1,
    Reliable = 2,
    Ack = 3,
}

impl FrameKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FrameKind::Unreliable),
            1 => Some(FrameKind::Sequenced),
            2 => Some(FrameKind::Reliable),
            3 => Some(FrameKind::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("reliable frame {seq} unacknowledged after {attempts} attempts")]
    Exhausted { seq: u32, attempts: u32 },
}

#[derive(Debug)]
struct PendingFrame {
    frame: Bytes,
    last_sent: Instant,
    attempts: u32,
}

/// Result of feeding one datagram into a [`PeerLink`]
#[derive(Debug, Default)]
pub struct Incoming {
    /// Envelopes ready for the application, in delivery order
    pub delivered: Vec<Bytes>,
    /// Acknowledgement to send back, if the datagram was reliable
    pub ack: Option<Bytes>,
}

/// Channel state for one remote peer
#[derive(Debug)]
pub struct PeerLink {
    next_reliable_out: u32,
    next_sequenced_out: u32,
    pending: BTreeMap<u32, PendingFrame>,
    next_reliable_in: u32,
    reorder: BTreeMap<u32, Bytes>,
    last_sequenced_in: Option<u32>,
    last_heard: Instant,
}

fn frame(kind: FrameKind, seq: u32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.put_u8(kind as u8);
    buf.put_u32_le(seq);
    buf.put_slice(body);
    buf.freeze()
}

/// True when `a` is newer than `b` under wrapping arithmetic
fn newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

impl PeerLink {
    pub fn new(now: Instant) -> Self {
        Self {
            next_reliable_out: 0,
            next_sequenced_out: 0,
            pending: BTreeMap::new(),
            next_reliable_in: 0,
            reorder: BTreeMap::new(),
            last_sequenced_in: None,
            last_heard: now,
        }
    }

    /// Frames `body` for sending. Reliable frames are remembered until acked.
    pub fn wrap(&mut self, delivery: Delivery, body: &[u8], now: Instant) -> Bytes {
        match delivery {
            Delivery::Unreliable => frame(FrameKind::Unreliable, 0, body),
            Delivery::Sequenced => {
                let seq = self.next_sequenced_out;
                self.next_sequenced_out = seq.wrapping_add(1);
                frame(FrameKind::Sequenced, seq, body)
            }
            Delivery::Reliable => {
                let seq = self.next_reliable_out;
                self.next_reliable_out = seq.wrapping_add(1);
                let bytes = frame(FrameKind::Reliable, seq, body);
                self.pending.insert(
                    seq,
                    PendingFrame {
                        frame: bytes.clone(),
                        last_sent: now,
                        attempts: 1,
                    },
                );
                bytes
            }
        }
    }

    /// Processes one received datagram
    pub fn receive(&mut self, datagram: &[u8], now: Instant) -> Result<Incoming, CodecError> {
        if datagram.len() < FRAME_HEADER_LEN {
            return Err(CodecError::MalformedPacket(format!(
                "frame of {} bytes is shorter than its header",
                datagram.len()
            )));
        }

        let kind = FrameKind::from_u8(datagram[0]).ok_or_else(|| {
            CodecError::MalformedPacket(format!("unknown frame kind {}", datagram[0]))
        })?;
        let seq = u32::from_le_bytes([datagram[1], datagram[2], datagram[3], datagram[4]]);
        let body = &datagram[FRAME_HEADER_LEN..];

        self.last_heard = now;
        let mut incoming = Incoming::default();

        match kind {
            FrameKind::Unreliable => {
                incoming.delivered.push(Bytes::copy_from_slice(body));
            }
            FrameKind::Sequenced => {
                let fresh = match self.last_sequenced_in {
                    Some(last) => newer(seq, last),
                    None => true,
                };
                if fresh {
                    self.last_sequenced_in = Some(seq);
                    incoming.delivered.push(Bytes::copy_from_slice(body));
                }
            }
            FrameKind::Reliable => {
                // Always ack, duplicates included, so a lost ack gets repaired
                incoming.ack = Some(frame(FrameKind::Ack, seq, &[]));

                let ahead = seq.wrapping_sub(self.next_reliable_in);
                if ahead == 0 {
                    incoming.delivered.push(Bytes::copy_from_slice(body));
                    self.next_reliable_in = self.next_reliable_in.wrapping_add(1);
                    while let Some(next) = self.reorder.remove(&self.next_reliable_in) {
                        incoming.delivered.push(next);
                        self.next_reliable_in = self.next_reliable_in.wrapping_add(1);
                    }
                } else if ahead < REORDER_WINDOW {
                    self.reorder
                        .entry(seq)
                        .or_insert_with(|| Bytes::copy_from_slice(body));
                }
            }
            FrameKind::Ack => {
                self.pending.remove(&seq);
            }
        }

        Ok(incoming)
    }

    /// Collects reliable frames whose retransmission timer expired
    ///
    /// Fails once any frame has been sent `max_attempts` times without an
    /// acknowledgement; the peer should then be considered gone.
    pub fn resend_due(
        &mut self,
        now: Instant,
        rto: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Bytes>, LinkError> {
        let mut due = Vec::new();
        for (seq, pending) in self.pending.iter_mut() {
            if now.duration_since(pending.last_sent) < rto {
                continue;
            }
            if pending.attempts >= max_attempts {
                return Err(LinkError::Exhausted {
                    seq: *seq,
                    attempts: pending.attempts,
                });
            }
            pending.attempts += 1;
            pending.last_sent = now;
            due.push(pending.frame.clone());
        }
        Ok(due)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heard)
    }

    pub fn unacked(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(link: &mut PeerLink, datagram: &Bytes, now: Instant) -> Vec<Bytes> {
        link.receive(datagram, now).unwrap().delivered
    }

    #[test]
    fn test_reliable_in_order_delivery_and_ack() {
        let now = Instant::now();
        let mut sender = PeerLink::new(now);
        let mut receiver = PeerLink::new(now);

        let frame = sender.wrap(Delivery::Reliable, b"one", now);
        assert_eq!(sender.unacked(), 1);

        let incoming = receiver.receive(&frame, now).unwrap();
        assert_eq!(incoming.delivered, vec![Bytes::from_static(b"one")]);

        let ack = incoming.ack.expect("reliable frames are acked");
        sender.receive(&ack, now).unwrap();
        assert_eq!(sender.unacked(), 0);
    }

    #[test]
    fn test_reliable_reordering() {
        let now = Instant::now();
        let mut sender = PeerLink::new(now);
        let mut receiver = PeerLink::new(now);

        let first = sender.wrap(Delivery::Reliable, b"a", now);
        let second = sender.wrap(Delivery::Reliable, b"b", now);
        let third = sender.wrap(Delivery::Reliable, b"c", now);

        assert!(deliver(&mut receiver, &third, now).is_empty());
        assert!(deliver(&mut receiver, &second, now).is_empty());
        assert_eq!(
            deliver(&mut receiver, &first, now),
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c")
            ]
        );
    }

    #[test]
    fn test_reliable_duplicate_is_acked_but_not_redelivered() {
        let now = Instant::now();
        let mut sender = PeerLink::new(now);
        let mut receiver = PeerLink::new(now);

        let frame = sender.wrap(Delivery::Reliable, b"x", now);
        assert_eq!(deliver(&mut receiver, &frame, now).len(), 1);

        let again = receiver.receive(&frame, now).unwrap();
        assert!(again.delivered.is_empty());
        assert!(again.ack.is_some());
    }

    #[test]
    fn test_sequenced_drops_stale() {
        let now = Instant::now();
        let mut sender = PeerLink::new(now);
        let mut receiver = PeerLink::new(now);

        let old = sender.wrap(Delivery::Sequenced, b"old", now);
        let new = sender.wrap(Delivery::Sequenced, b"new", now);

        assert_eq!(deliver(&mut receiver, &new, now).len(), 1);
        assert!(deliver(&mut receiver, &old, now).is_empty());
    }

    #[test]
    fn test_unreliable_passthrough() {
        let now = Instant::now();
        let mut sender = PeerLink::new(now);
        let mut receiver = PeerLink::new(now);

        let frame = sender.wrap(Delivery::Unreliable, b"hb", now);
        let incoming = receiver.receive(&frame, now).unwrap();
        assert_eq!(incoming.delivered, vec![Bytes::from_static(b"hb")]);
        assert!(incoming.ack.is_none());
        assert_eq!(sender.unacked(), 0);
    }

    #[test]
    fn test_resend_and_exhaustion() {
        let start = Instant::now();
        let rto = Duration::from_millis(100);
        let mut link = PeerLink::new(start);
        link.wrap(Delivery::Reliable, b"r", start);

        assert!(link.resend_due(start, rto, 3).unwrap().is_empty());
        assert_eq!(link.resend_due(start + rto, rto, 3).unwrap().len(), 1);
        assert_eq!(link.resend_due(start + rto * 2, rto, 3).unwrap().len(), 1);
        assert_eq!(
            link.resend_due(start + rto * 3, rto, 3),
            Err(LinkError::Exhausted {
                seq: 0,
                attempts: 3
            })
        );
    }

    #[test]
    fn test_malformed_frames() {
        let mut link = PeerLink::new(Instant::now());
        assert!(link.receive(&[2, 0, 0], Instant::now()).is_err());
        assert!(link.receive(&[9, 0, 0, 0, 0], Instant::now()).is_err());
    }

    #[test]
    fn test_sequence_wraparound() {
        assert!(newer(0, u32::MAX));
        assert!(newer(5, 3));
        assert!(!newer(3, 5));
    }
}
