//! Stop-and-wait ARQ with explicit negative acknowledgment.
//!
//! The sender keeps exactly one packet in flight and retransmits it on
//! timeout. The receiver answers every packet: an ACK echoing the accepted
//! seqnum, or a NAK (blank payload) naming the rejected one. Only the timer
//! drives retransmission; NAKs and bad ACKs are simply dropped by the sender.

use rdt_lab_abstract::{Message, Packet, ProtocolError, SystemContext, TransportEntity};

use crate::{DEFAULT_TIMEOUT, check_seqnum_limit};

pub struct StopAndWaitSender {
    seqnum_limit: u32,
    confirmed_seq: u32,
    pending_seq: u32,
    /// Copy of the in-flight message, kept for retransmission.
    pending_message: Option<Message>,
    timeout: f64,
}

impl StopAndWaitSender {
    pub fn new(seqnum_limit: u32) -> Result<Self, ProtocolError> {
        check_seqnum_limit(seqnum_limit, 2)?;
        Ok(Self {
            seqnum_limit,
            confirmed_seq: 0,
            pending_seq: 1,
            pending_message: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn confirmed_seq(&self) -> u32 {
        self.confirmed_seq
    }

    pub fn pending_seq(&self) -> u32 {
        self.pending_seq
    }

    pub fn is_outstanding(&self) -> bool {
        self.pending_message.is_some()
    }

    fn transmit(&self, ctx: &mut dyn SystemContext, message: &Message) {
        let packet = Packet::data(self.pending_seq, self.confirmed_seq, message);
        ctx.log(&format!(
            "SAW send seq={} ack={} at t={:.2}",
            packet.seqnum,
            packet.acknum,
            ctx.get_time()
        ));
        ctx.to_layer3(packet);
        ctx.start_timer(self.timeout);
    }
}

impl TransportEntity for StopAndWaitSender {
    fn can_send(&self) -> bool {
        !self.is_outstanding()
    }

    fn send(&mut self, ctx: &mut dyn SystemContext, message: Message) -> Result<(), ProtocolError> {
        if self.is_outstanding() {
            return Err(ProtocolError::SenderBusy {
                seqnum: self.pending_seq,
            });
        }
        self.transmit(ctx, &message);
        self.pending_message = Some(message);
        Ok(())
    }

    fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupted() {
            ctx.log("SAW sender dropping corrupted reply");
            return;
        }
        if packet.is_nak() {
            ctx.log(&format!("SAW sender ignoring NAK for seq {}", packet.acknum));
            return;
        }
        if !self.is_outstanding() || packet.acknum != self.pending_seq {
            ctx.log(&format!(
                "SAW sender ignoring ACK {} (waiting for {})",
                packet.acknum, self.pending_seq
            ));
            return;
        }

        ctx.log(&format!("SAW sender received ACK {}", packet.acknum));
        ctx.stop_timer();
        self.confirmed_seq = self.pending_seq;
        self.pending_seq = (self.pending_seq + 1) % self.seqnum_limit;
        self.pending_message = None;
    }

    fn timer_interrupt(&mut self, ctx: &mut dyn SystemContext) {
        let Some(message) = self.pending_message else {
            ctx.log("SAW sender timer fired with nothing outstanding");
            return;
        };
        ctx.log(&format!("SAW timeout, retransmitting seq {}", self.pending_seq));
        self.transmit(ctx, &message);
    }
}

pub struct StopAndWaitReceiver {
    seqnum_limit: u32,
    expected_seq: u32,
    last_accepted_seq: u32,
}

impl StopAndWaitReceiver {
    pub fn new(seqnum_limit: u32) -> Result<Self, ProtocolError> {
        check_seqnum_limit(seqnum_limit, 2)?;
        Ok(Self {
            seqnum_limit,
            expected_seq: 1,
            last_accepted_seq: 0,
        })
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn last_accepted_seq(&self) -> u32 {
        self.last_accepted_seq
    }
}

impl TransportEntity for StopAndWaitReceiver {
    fn send(&mut self, _ctx: &mut dyn SystemContext, _message: Message) -> Result<(), ProtocolError> {
        Err(ProtocolError::SendOnReceiver)
    }

    fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        let corrupted = packet.is_corrupted();
        let known = packet.seqnum == self.expected_seq || packet.seqnum == self.last_accepted_seq;

        if corrupted || !known {
            // seqnum may itself be garbage; keep the NAK's acknum inside the seqnum space
            let rejected = packet.seqnum % self.seqnum_limit;
            ctx.log(&format!(
                "SAW receiver NAK seq {} ({})",
                rejected,
                if corrupted { "corrupted" } else { "unexpected" }
            ));
            ctx.to_layer3(Packet::nak(self.expected_seq, rejected));
            return;
        }

        if packet.seqnum == self.last_accepted_seq {
            ctx.log(&format!(
                "SAW receiver duplicate seq {}, re-ACK without delivery",
                packet.seqnum
            ));
        } else {
            ctx.log(&format!("SAW receiver delivering seq {}", packet.seqnum));
            ctx.to_layer5(packet.message());
        }

        ctx.to_layer3(Packet::ack(packet.seqnum, packet.payload));
        self.last_accepted_seq = packet.seqnum;
        self.expected_seq = (packet.seqnum + 1) % self.seqnum_limit;
    }

    fn timer_interrupt(&mut self, _ctx: &mut dyn SystemContext) {}
}
