use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub seed: u64,
    /// Stop processing events scheduled after this time.
    pub time_limit: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 1.0,
            max_latency: 10.0,
            seed: 0,
            time_limit: None,
        }
    }
}

impl SimConfig {
    /// Reject settings the channel cannot sample from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        let latency_ok = self.min_latency >= 0.0
            && self.min_latency <= self.max_latency
            && self.max_latency.is_finite();
        if !latency_ok {
            return Err(ConfigError::InvalidLatency {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        if let Some(limit) = self.time_limit
            && (limit.is_nan() || limit < 0.0)
        {
            return Err(ConfigError::InvalidTimeLimit(limit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn inverted_latency_range_is_rejected() {
        let config = SimConfig {
            min_latency: 10.0,
            max_latency: 1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLatency {
                min: 10.0,
                max: 1.0
            })
        );
    }

    #[test]
    fn rates_outside_unit_interval_are_rejected() {
        let config = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate {
                name: "loss_rate",
                ..
            })
        ));

        let config = SimConfig {
            corrupt_rate: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_latency_and_time_limit_are_rejected() {
        let config = SimConfig {
            min_latency: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            time_limit: Some(-5.0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeLimit(-5.0)));
    }
}
