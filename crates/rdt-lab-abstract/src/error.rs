use thiserror::Error;

/// Contract violations by whoever drives a transport entity.
///
/// Channel loss and corruption are never reported through this type; entities
/// recover from those on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("send called while seqnum {seqnum} is still unacknowledged")]
    SenderBusy { seqnum: u32 },

    #[error("send called with a full window (base={base}, next_seq={next_seq}, window_size={window_size})")]
    WindowFull {
        base: u32,
        next_seq: u32,
        window_size: u32,
    },

    #[error("receiver entities do not accept application data")]
    SendOnReceiver,

    #[error("seqnum_limit {seqnum_limit} is too small: {reason}")]
    InvalidSeqnumLimit { seqnum_limit: u32, reason: String },

    #[error("window_size must be at least 1")]
    EmptyWindow,
}

/// Channel settings that cannot drive a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("latency range [{min}, {max}] is empty or negative")]
    InvalidLatency { min: f64, max: f64 },

    #[error("time_limit must be non-negative, got {0}")]
    InvalidTimeLimit(f64),

    #[error("mean_interval must be non-negative, got {0}")]
    InvalidInterval(f64),
}
