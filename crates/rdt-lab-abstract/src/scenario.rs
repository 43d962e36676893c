use crate::config::SimConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    pub protocol: ProtocolSettings,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

/// Which entity pair a scenario runs and how it is parameterized.
#[derive(Deserialize, Debug, Clone)]
pub struct ProtocolSettings {
    /// Builtin name, e.g. `stop-and-wait` or `gbn`.
    pub kind: String,
    pub seqnum_limit: u32,
    pub window_size: Option<u32>,
    pub timeout: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
    pub seed: Option<u64>,
    pub time_limit: Option<f64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.time_limit {
            config.time_limit = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application hands a message down at a specific time
    AppSend { time: f64, data: String },
    /// Application generates `count` messages with the given mean inter-arrival time
    MessageStream { count: u32, mean_interval: f64 },
    /// Deterministically drop the first packet sent by Sender with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Deterministically drop the first reply sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: u32 },
    /// Deterministically corrupt the first packet sent by Sender with given seq number
    CorruptNextFromSenderSeq { seq: u32 },
    /// Deterministically corrupt the first reply sent by Receiver with given ack number
    CorruptNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert that every submitted message was delivered exactly once, in order
    DeliveredInOrder,
    /// Assert the exact number of messages delivered upward
    DeliveredCount { count: usize },
    /// Assert that the total number of packets sent by Sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the number of sender timeouts is within range
    TimeoutCount { min: u32, max: Option<u32> },
    /// Assert that simulation finishes within time
    MaxDuration { time: f64 },
}
