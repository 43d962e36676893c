use rdt_lab_abstract::{Message, SimConfig};
use serde::Serialize;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: f64,
    pub submitted: Vec<Message>,
    pub delivered: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub sender_timeouts: u32,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Every submitted message arrived exactly once, in submission order.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered == self.submitted
    }

    /// Retransmitted sender packets beyond one per submitted message.
    pub fn retransmissions(&self) -> u32 {
        self.sender_packet_count
            .saturating_sub(self.submitted.len() as u32)
    }
}
