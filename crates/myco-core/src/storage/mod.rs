pub mod records;
pub mod retention;
pub mod series;

pub use records::{ActuatorHistoryRecord, ActuatorsRecord, SensorHistoryRecord};
pub use retention::{HistoryRetentionJob, PersistenceFailure, RetentionReport, RetentionStep};
pub use series::{SeriesStats, TimeSeriesBuffer};

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::sensors::{SensorReadings, SensorType};

/// Live ceiling for high-frequency sensor streams
pub const LIVE_CEILING: usize = 1440;

/// Live ceiling while running on the simulated source
pub const FALLBACK_CEILING: usize = 24;

/// Maximum number of records kept in the remote sensor history
pub const PERSISTED_CEILING: usize = 1000;

/// A single timestamped reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "time")]
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub const fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One [`TimeSeriesBuffer`] per channel
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSet {
    temperature: TimeSeriesBuffer,
    humidity: TimeSeriesBuffer,
    co2: TimeSeriesBuffer,
}

impl SeriesSet {
    pub fn new(live_ceiling: usize) -> Self {
        Self {
            temperature: TimeSeriesBuffer::new(SensorType::Temperature, live_ceiling),
            humidity: TimeSeriesBuffer::new(SensorType::Humidity, live_ceiling),
            co2: TimeSeriesBuffer::new(SensorType::Co2, live_ceiling),
        }
    }

    pub const fn get(&self, sensor: SensorType) -> &TimeSeriesBuffer {
        match sensor {
            SensorType::Temperature => &self.temperature,
            SensorType::Humidity => &self.humidity,
            SensorType::Co2 => &self.co2,
        }
    }

    pub const fn get_mut(&mut self, sensor: SensorType) -> &mut TimeSeriesBuffer {
        match sensor {
            SensorType::Temperature => &mut self.temperature,
            SensorType::Humidity => &mut self.humidity,
            SensorType::Co2 => &mut self.co2,
        }
    }

    /// Append one sample per channel and evict each buffer back under its ceiling.
    pub fn push_readings(&mut self, timestamp: Timestamp, readings: &SensorReadings) {
        for sensor in SensorType::ALL {
            let buffer = self.get_mut(sensor);
            buffer.append(Sample::new(timestamp, readings.get(sensor)));
            buffer.evict_if_over_capacity();
        }
    }

    /// Latest value of every channel, with fallbacks for empty channels
    pub fn latest_readings(&self) -> SensorReadings {
        SensorReadings::new(
            self.temperature.latest().value,
            self.humidity.latest().value,
            self.co2.latest().value,
        )
    }

    pub fn has_data(&self) -> bool {
        SensorType::ALL.iter().any(|&s| !self.get(s).is_empty())
    }

    pub fn clear(&mut self) {
        for sensor in SensorType::ALL {
            self.get_mut(sensor).clear();
        }
    }
}
