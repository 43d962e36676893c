//! Builtin reliable-data-transfer entities: stop-and-wait and Go-Back-N.

pub mod go_back_n;
pub mod registry;
pub mod stop_and_wait;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use rdt_lab_abstract::{ProtocolError, ProtocolSettings, TransportEntity};
use tracing::debug;

pub use go_back_n::{GoBackNReceiver, GoBackNSender};
pub use stop_and_wait::{StopAndWaitReceiver, StopAndWaitSender};

/// Retransmission interval used when none is configured.
pub const DEFAULT_TIMEOUT: f64 = 25.0;

/// Window size used for Go-Back-N when none is configured.
pub const DEFAULT_WINDOW_SIZE: u32 = 8;

pub(crate) fn check_seqnum_limit(seqnum_limit: u32, min: u32) -> Result<(), ProtocolError> {
    if seqnum_limit < min {
        return Err(ProtocolError::InvalidSeqnumLimit {
            seqnum_limit,
            reason: format!("need at least {min} distinct seqnums"),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    StopAndWait,
    GoBackN,
}

/// Everything needed to construct a fresh sender/receiver pair.
#[derive(Clone, Debug)]
pub struct PairConfig {
    pub kind: ProtocolKind,
    pub seqnum_limit: u32,
    pub window_size: u32,
    pub timeout: f64,
}

impl PairConfig {
    pub fn new(kind: ProtocolKind, seqnum_limit: u32) -> Self {
        Self {
            kind,
            seqnum_limit,
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the `[protocol]` table of a scenario file.
    pub fn from_settings(settings: &ProtocolSettings) -> Result<Self> {
        let kind = registry::protocol_by_name(&settings.kind)?;
        let mut config = Self::new(kind, settings.seqnum_limit);
        if let Some(window_size) = settings.window_size {
            config = config.window_size(window_size);
        }
        if let Some(timeout) = settings.timeout {
            config = config.timeout(timeout);
        }
        Ok(config)
    }
}

/// Construct a fresh sender and receiver. Instances share no state.
pub fn build_pair(
    config: &PairConfig,
) -> Result<(Box<dyn TransportEntity>, Box<dyn TransportEntity>)> {
    debug!("Building {:?} pair: {:?}", config.kind, config);
    let pair: (Box<dyn TransportEntity>, Box<dyn TransportEntity>) = match config.kind {
        ProtocolKind::StopAndWait => (
            Box::new(
                StopAndWaitSender::new(config.seqnum_limit)
                    .context("Failed to build stop-and-wait sender")?
                    .with_timeout(config.timeout),
            ),
            Box::new(
                StopAndWaitReceiver::new(config.seqnum_limit)
                    .context("Failed to build stop-and-wait receiver")?,
            ),
        ),
        ProtocolKind::GoBackN => (
            Box::new(
                GoBackNSender::new(config.seqnum_limit, config.window_size)
                    .context("Failed to build Go-Back-N sender")?
                    .with_timeout(config.timeout),
            ),
            Box::new(
                GoBackNReceiver::new(config.seqnum_limit)
                    .context("Failed to build Go-Back-N receiver")?,
            ),
        ),
    };
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_pair_rejects_bad_limits() {
        let config = PairConfig::new(ProtocolKind::GoBackN, 4).window_size(4);
        assert!(build_pair(&config).is_err());

        let config = PairConfig::new(ProtocolKind::StopAndWait, 1);
        assert!(build_pair(&config).is_err());
    }

    #[test]
    fn fresh_senders_accept_data() {
        for kind in [ProtocolKind::StopAndWait, ProtocolKind::GoBackN] {
            let (sender, receiver) = build_pair(&PairConfig::new(kind, 16)).unwrap();
            assert!(sender.can_send());
            assert!(!receiver.can_send());
        }
    }

    #[test]
    fn settings_override_defaults() {
        let settings = ProtocolSettings {
            kind: "gbn".into(),
            seqnum_limit: 16,
            window_size: Some(4),
            timeout: None,
        };
        let config = PairConfig::from_settings(&settings).unwrap();
        assert_eq!(config.kind, ProtocolKind::GoBackN);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
