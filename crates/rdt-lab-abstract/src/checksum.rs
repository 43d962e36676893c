use crate::packet::Packet;

/// 16-bit ones' complement checksum over a packet's payload, seqnum and acknum.
///
/// The payload is read as consecutive little-endian 16-bit words. Every
/// addition folds the carry back into the low 16 bits. The two header fields
/// are added into the same accumulator, split into 16-bit halves so values
/// outside `u16` still fold correctly.
pub fn packet_checksum(packet: &Packet) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = packet.payload.chunks_exact(2);

    for chunk in &mut chunks {
        sum = fold(sum + u16::from_le_bytes([chunk[0], chunk[1]]) as u32);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum = fold(sum + byte as u32);
    }

    for field in [packet.seqnum, packet.acknum] {
        sum = fold(sum + (field & 0xFFFF));
        sum = fold(sum + (field >> 16));
    }

    !(sum as u16)
}

fn fold(mut sum: u32) -> u32 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum
}
