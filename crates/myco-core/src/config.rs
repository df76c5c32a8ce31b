use alloc::vec::Vec;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sensors::SensorRanges;
use crate::storage::{FALLBACK_CEILING, LIVE_CEILING, PERSISTED_CEILING};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to encode configuration")]
    Encode,
    #[error("failed to decode configuration")]
    Decode,
}

/// Engine tunables
///
/// Intervals are stored in milliseconds and read back as [`Duration`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Alert bands per channel
    pub sensor_ranges: SensorRanges,
    /// Live ceiling of every buffer when fed by the remote store
    pub live_ceiling: u32,
    /// Live ceiling of every buffer when fed by the simulated walk
    pub fallback_ceiling: u32,
    /// Records kept in `Sensors/history` after pruning
    pub persisted_ceiling: u32,
    /// Records fetched by the startup snapshot
    pub snapshot_ceiling: u32,
    pub simulation_tick_ms: u64,
    pub retention_interval_ms: u64,
    pub alert_ttl_ms: u64,
    /// How long a local actuator command stays provisional without a remote echo
    pub optimistic_timeout_ms: u64,
    /// Samples generated before the first simulation tick
    pub warm_up_samples: u32,
    pub warm_up_interval_ms: u64,
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_ranges: SensorRanges::default(),
            live_ceiling: LIVE_CEILING as u32,
            fallback_ceiling: FALLBACK_CEILING as u32,
            persisted_ceiling: PERSISTED_CEILING as u32,
            snapshot_ceiling: PERSISTED_CEILING as u32,
            simulation_tick_ms: 5_000,
            retention_interval_ms: 60_000,
            alert_ttl_ms: 10_000,
            optimistic_timeout_ms: 15_000,
            warm_up_samples: 24,
            warm_up_interval_ms: 3_600_000,
            rng_seed: 0x6d79_636f,
        }
    }
}

impl Config {
    pub const fn simulation_tick(&self) -> Duration {
        Duration::from_millis(self.simulation_tick_ms)
    }

    pub const fn retention_interval(&self) -> Duration {
        Duration::from_millis(self.retention_interval_ms)
    }

    pub const fn alert_ttl(&self) -> Duration {
        Duration::from_millis(self.alert_ttl_ms)
    }

    pub const fn optimistic_timeout(&self) -> Duration {
        Duration::from_millis(self.optimistic_timeout_ms)
    }

    /// Encode as a compact binary blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.live_ceiling, 1440);
        assert_eq!(config.fallback_ceiling, 24);
        assert_eq!(config.alert_ttl(), Duration::from_secs(10));
        assert_eq!(config.simulation_tick(), Duration::from_secs(5));
        assert_eq!(config.sensor_ranges.co2.max, 1200.0);
    }

    #[test]
    fn test_blob_restores_overrides() {
        let config = Config {
            live_ceiling: 24,
            rng_seed: 42,
            ..Config::default()
        };
        let restored = Config::from_bytes(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let bytes = Config::default().to_bytes().unwrap();
        assert_eq!(
            Config::from_bytes(&bytes[..bytes.len() / 2]),
            Err(ConfigError::Decode)
        );
    }
}
