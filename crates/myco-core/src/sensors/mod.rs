//! Measurement channels, alert bands and current-value records

mod simulated;

pub use simulated::{RandomWalk, SampleSource};

use serde::{Deserialize, Serialize};

/// Measurement channel reported by the grow-room sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Co2,
}

impl SensorType {
    /// Every channel, in display order.
    pub const ALL: [SensorType; 3] = [Self::Temperature, Self::Humidity, Self::Co2];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Co2 => "CO2",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Co2 => "ppm",
        }
    }

    /// Value substituted when a channel has no data at all.
    ///
    /// This is the only place default domain values stand in for absent
    /// readings.
    pub const fn fallback_value(self) -> f64 {
        match self {
            Self::Temperature => 23.0,
            Self::Humidity => 80.0,
            Self::Co2 => 800.0,
        }
    }

    /// Hard physical bounds `(min, max)` the simulated walk is clamped to
    pub const fn physical_bounds(self) -> (f64, f64) {
        match self {
            Self::Temperature => (15.0, 35.0),
            Self::Humidity => (50.0, 95.0),
            Self::Co2 => (300.0, 2000.0),
        }
    }
}

/// Classification of a reading against its channel's alert band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Low,
    Normal,
    High,
}

impl SensorStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Alert band for one channel
///
/// These bands drive alerting only. Automatic control uses the separate
/// admin-tunable [`crate::validation::ControlRanges`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRange {
    pub min: f64,
    pub max: f64,
    pub optimal: f64,
}

impl SensorRange {
    pub const fn new(min: f64, max: f64, optimal: f64) -> Self {
        Self { min, max, optimal }
    }

    /// Below `min` is low, above `max` is high, anything else is normal.
    pub fn classify(&self, value: f64) -> SensorStatus {
        if value < self.min {
            SensorStatus::Low
        } else if value > self.max {
            SensorStatus::High
        } else {
            SensorStatus::Normal
        }
    }
}

/// Alert bands for all channels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRanges {
    pub temperature: SensorRange,
    pub humidity: SensorRange,
    pub co2: SensorRange,
}

impl SensorRanges {
    pub const fn get(&self, sensor: SensorType) -> &SensorRange {
        match sensor {
            SensorType::Temperature => &self.temperature,
            SensorType::Humidity => &self.humidity,
            SensorType::Co2 => &self.co2,
        }
    }
}

impl Default for SensorRanges {
    fn default() -> Self {
        Self {
            temperature: SensorRange::new(18.0, 28.0, 23.0),
            humidity: SensorRange::new(70.0, 90.0, 80.0),
            co2: SensorRange::new(400.0, 1200.0, 800.0),
        }
    }
}

/// Current value record stored at `Sensors`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "CO2")]
    pub co2: f64,
}

impl SensorReadings {
    pub const fn new(temperature: f64, humidity: f64, co2: f64) -> Self {
        Self {
            temperature,
            humidity,
            co2,
        }
    }

    /// Readings made of every channel's fallback value
    pub const fn fallback() -> Self {
        Self::new(
            SensorType::Temperature.fallback_value(),
            SensorType::Humidity.fallback_value(),
            SensorType::Co2.fallback_value(),
        )
    }

    pub const fn get(&self, sensor: SensorType) -> f64 {
        match sensor {
            SensorType::Temperature => self.temperature,
            SensorType::Humidity => self.humidity,
            SensorType::Co2 => self.co2,
        }
    }
}

impl core::fmt::Display for SensorReadings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "temperature: {:.1}°C, humidity: {:.1}%, co2: {:.0} ppm",
            self.temperature, self.humidity, self.co2
        )
    }
}
