//! Go-Back-N sliding-window ARQ.
//!
//! [`GoBackNSender`] keeps up to `window_size` packets in flight, all covered
//! by one timer for the oldest of them. ACKs are cumulative: acknum `k`
//! acknowledges every outstanding seqnum up to and including `k`. On timeout
//! the whole window is resent in order.
//!
//! [`GoBackNReceiver`] accepts strictly in-order packets and answers every
//! arrival with an ACK for the last in-order seqnum it holds.

use std::collections::VecDeque;

use rdt_lab_abstract::{Message, Packet, ProtocolError, SystemContext, TransportEntity};

use crate::{DEFAULT_TIMEOUT, check_seqnum_limit};

/// Forward distance from `from` to `to` in a sequence space of size `limit`.
/// Both values must already be below `limit`.
fn seq_distance(from: u32, to: u32, limit: u32) -> u32 {
    if to >= from {
        to - from
    } else {
        limit - from + to
    }
}

pub struct GoBackNSender {
    seqnum_limit: u32,
    window_size: u32,
    base: u32,
    next_seq: u32,
    /// Packets for `[base, next_seq)`, front = `base`.
    outstanding: VecDeque<Packet>,
    timeout: f64,
}

impl GoBackNSender {
    pub fn new(seqnum_limit: u32, window_size: u32) -> Result<Self, ProtocolError> {
        if window_size == 0 {
            return Err(ProtocolError::EmptyWindow);
        }
        if seqnum_limit <= window_size {
            return Err(ProtocolError::InvalidSeqnumLimit {
                seqnum_limit,
                reason: format!("must exceed window_size {window_size}"),
            });
        }
        check_seqnum_limit(seqnum_limit, 2)?;
        Ok(Self {
            seqnum_limit,
            window_size,
            base: 0,
            next_seq: 0,
            outstanding: VecDeque::with_capacity(window_size as usize),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Number of packets sent but not yet acknowledged.
    pub fn in_flight(&self) -> u32 {
        seq_distance(self.base, self.next_seq, self.seqnum_limit)
    }

    /// Seqnums currently awaiting acknowledgment, oldest first.
    pub fn outstanding_seqnums(&self) -> impl Iterator<Item = u32> + '_ {
        self.outstanding.iter().map(|p| p.seqnum)
    }

    fn last_acked(&self) -> u32 {
        (self.base + self.seqnum_limit - 1) % self.seqnum_limit
    }
}

impl TransportEntity for GoBackNSender {
    fn can_send(&self) -> bool {
        self.in_flight() < self.window_size
    }

    fn send(&mut self, ctx: &mut dyn SystemContext, message: Message) -> Result<(), ProtocolError> {
        if !self.can_send() {
            return Err(ProtocolError::WindowFull {
                base: self.base,
                next_seq: self.next_seq,
                window_size: self.window_size,
            });
        }

        let packet = Packet::data(self.next_seq, self.last_acked(), &message);
        ctx.log(&format!(
            "GBN send seq={} (base={}, in flight={}) at t={:.2}",
            packet.seqnum,
            self.base,
            self.in_flight() + 1,
            ctx.get_time()
        ));

        let first_outstanding = self.outstanding.is_empty();
        self.outstanding.push_back(packet.clone());
        ctx.to_layer3(packet);
        if first_outstanding {
            ctx.start_timer(self.timeout);
        }
        self.next_seq = (self.next_seq + 1) % self.seqnum_limit;
        Ok(())
    }

    fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupted() {
            ctx.log("GBN sender dropping corrupted ACK");
            return;
        }
        if packet.acknum >= self.seqnum_limit {
            ctx.log(&format!("GBN sender dropping out-of-range ACK {}", packet.acknum));
            return;
        }

        let distance = seq_distance(self.base, packet.acknum, self.seqnum_limit);
        if distance > self.window_size {
            ctx.log(&format!(
                "GBN sender ignoring ACK {} outside [{}, {}]",
                packet.acknum,
                self.base,
                (self.base + self.window_size) % self.seqnum_limit
            ));
            return;
        }
        if distance >= self.in_flight() {
            ctx.log(&format!("GBN sender ignoring ACK {} for unsent seq", packet.acknum));
            return;
        }

        ctx.stop_timer();
        for _ in 0..=distance {
            self.outstanding.pop_front();
        }
        self.base = (packet.acknum + 1) % self.seqnum_limit;
        ctx.log(&format!(
            "GBN sender cumulative ACK {}, base -> {}",
            packet.acknum, self.base
        ));

        // one timer always covers the oldest outstanding packet
        if !self.outstanding.is_empty() {
            ctx.start_timer(self.timeout);
        }
    }

    fn timer_interrupt(&mut self, ctx: &mut dyn SystemContext) {
        if self.outstanding.is_empty() {
            ctx.log("GBN sender timer fired with an empty window");
            return;
        }

        ctx.log(&format!(
            "GBN timeout, going back to seq {} ({} packets)",
            self.base,
            self.outstanding.len()
        ));
        ctx.start_timer(self.timeout);
        for packet in &self.outstanding {
            ctx.to_layer3(packet.clone());
        }
    }
}

pub struct GoBackNReceiver {
    seqnum_limit: u32,
    expected_seq: u32,
}

impl GoBackNReceiver {
    pub fn new(seqnum_limit: u32) -> Result<Self, ProtocolError> {
        check_seqnum_limit(seqnum_limit, 2)?;
        Ok(Self {
            seqnum_limit,
            expected_seq: 0,
        })
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Last seqnum received in order; wraps to `seqnum_limit - 1` before the first delivery.
    pub fn last_in_order(&self) -> u32 {
        (self.expected_seq + self.seqnum_limit - 1) % self.seqnum_limit
    }
}

impl TransportEntity for GoBackNReceiver {
    fn send(&mut self, _ctx: &mut dyn SystemContext, _message: Message) -> Result<(), ProtocolError> {
        Err(ProtocolError::SendOnReceiver)
    }

    fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupted() {
            ctx.log(&format!(
                "GBN receiver dropping corrupted packet, re-ACK {}",
                self.last_in_order()
            ));
        } else if packet.seqnum != self.expected_seq {
            ctx.log(&format!(
                "GBN receiver out-of-order seq {} (expect {}), re-ACK {}",
                packet.seqnum,
                self.expected_seq,
                self.last_in_order()
            ));
        } else {
            ctx.log(&format!("GBN receiver delivering seq {}", packet.seqnum));
            ctx.to_layer5(packet.message());
            self.expected_seq = (self.expected_seq + 1) % self.seqnum_limit;
        }

        ctx.to_layer3(Packet::ack(self.last_in_order(), packet.payload));
    }

    fn timer_interrupt(&mut self, _ctx: &mut dyn SystemContext) {}
}
