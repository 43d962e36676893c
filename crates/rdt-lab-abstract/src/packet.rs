use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::packet_checksum;

/// Size in bytes of every application message and packet payload.
pub const MSG_SIZE: usize = 20;

/// Payload reserved by the stop-and-wait receiver to mark a negative acknowledgment.
/// A data message made entirely of spaces is indistinguishable from a NAK.
pub const NAK_PAYLOAD: [u8; MSG_SIZE] = [b' '; MSG_SIZE];

/// The data unit handed down from the application (layer 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub data: [u8; MSG_SIZE],
}

impl Message {
    pub fn new(data: [u8; MSG_SIZE]) -> Self {
        Self { data }
    }

    /// Build a message from an arbitrary byte slice, truncating or zero-padding to `MSG_SIZE`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut data = [0u8; MSG_SIZE];
        let len = bytes.len().min(MSG_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// A message made of `MSG_SIZE` copies of the same byte.
    pub fn filled(byte: u8) -> Self {
        Self {
            data: [byte; MSG_SIZE],
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

/// The data unit exchanged with the unreliable channel (layer 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub seqnum: u32,
    pub acknum: u32,
    pub checksum: u16,
    pub payload: [u8; MSG_SIZE],
}

impl Packet {
    /// Build a packet whose checksum matches its own fields.
    pub fn new(seqnum: u32, acknum: u32, payload: [u8; MSG_SIZE]) -> Self {
        let mut packet = Self {
            seqnum,
            acknum,
            checksum: 0,
            payload,
        };
        packet.checksum = packet_checksum(&packet);
        packet
    }

    /// Create a data packet carrying an application message.
    pub fn data(seqnum: u32, acknum: u32, message: &Message) -> Self {
        Self::new(seqnum, acknum, message.data)
    }

    /// Create a positive acknowledgment; `seqnum` and `acknum` both carry the acknowledged number.
    pub fn ack(acknum: u32, payload: [u8; MSG_SIZE]) -> Self {
        Self::new(acknum, acknum, payload)
    }

    /// Create a negative acknowledgment rejecting `rejected`, advertising `expected`.
    pub fn nak(expected: u32, rejected: u32) -> Self {
        Self::new(expected, rejected, NAK_PAYLOAD)
    }

    pub fn is_nak(&self) -> bool {
        self.payload == NAK_PAYLOAD
    }

    /// Recompute the checksum and compare it against the stored one.
    pub fn is_corrupted(&self) -> bool {
        packet_checksum(self) != self.checksum
    }

    pub fn message(&self) -> Message {
        Message::new(self.payload)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet(seqnum={}, acknum={}, checksum={:04X}, payload={})",
            self.seqnum,
            self.acknum,
            self.checksum,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_packet_is_not_corrupted() {
        let packet = Packet::data(3, 2, &Message::filled(b'c'));
        assert!(!packet.is_corrupted());
        assert!(!packet.is_nak());
    }

    #[test]
    fn nak_uses_blank_payload() {
        let nak = Packet::nak(4, 7);
        assert!(nak.is_nak());
        assert_eq!(nak.seqnum, 4);
        assert_eq!(nak.acknum, 7);
        assert!(!nak.is_corrupted());
    }

    #[test]
    fn ack_echoes_number_in_both_fields() {
        let ack = Packet::ack(5, [b'x'; MSG_SIZE]);
        assert_eq!(ack.seqnum, 5);
        assert_eq!(ack.acknum, 5);
    }

    #[test]
    fn tampered_field_is_detected() {
        let mut packet = Packet::data(1, 0, &Message::filled(b'a'));
        packet.payload[0] = b'Z';
        assert!(packet.is_corrupted());
    }

    #[test]
    fn message_from_slice_pads_and_truncates() {
        let short = Message::from_slice(b"hi");
        assert_eq!(&short.data[..2], b"hi");
        assert!(short.data[2..].iter().all(|&b| b == 0));

        let long = Message::from_slice(&[b'q'; 32]);
        assert_eq!(long, Message::filled(b'q'));
    }
}
