//! Record shapes exchanged with the remote store

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::control::{ActuatorState, ControlMode};
use crate::sensors::SensorReadings;

/// One entry of `Sensors/history`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorHistoryRecord {
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "CO2")]
    pub co2: f64,
    pub timestamp: Timestamp,
}

impl SensorHistoryRecord {
    pub const fn new(readings: &SensorReadings, timestamp: Timestamp) -> Self {
        Self {
            temperature: readings.temperature,
            humidity: readings.humidity,
            co2: readings.co2,
            timestamp,
        }
    }

    pub const fn readings(&self) -> SensorReadings {
        SensorReadings::new(self.temperature, self.humidity, self.co2)
    }
}

/// Current actuator booleans plus the mode flag, stored at `Actuators`
///
/// Missing actuator fields read as `false` and a missing `auto` flag reads as
/// automatic mode, so a partially written node still decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorsRecord {
    #[serde(default)]
    pub ventilation: bool,
    #[serde(default)]
    pub heating: bool,
    #[serde(default)]
    pub humidifier: bool,
    #[serde(default)]
    pub lighting: bool,
    #[serde(default = "auto_by_default")]
    pub auto: bool,
}

const fn auto_by_default() -> bool {
    true
}

impl Default for ActuatorsRecord {
    fn default() -> Self {
        Self {
            ventilation: false,
            heating: false,
            humidifier: false,
            lighting: false,
            auto: auto_by_default(),
        }
    }
}

impl ActuatorsRecord {
    pub const fn state(&self) -> ActuatorState {
        ActuatorState {
            ventilation: self.ventilation,
            heating: self.heating,
            humidifier: self.humidifier,
            lighting: self.lighting,
        }
    }

    pub const fn mode(&self) -> ControlMode {
        if self.auto {
            ControlMode::Auto
        } else {
            ControlMode::Manual
        }
    }
}

/// One entry of `Actuators/history`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorHistoryRecord {
    pub ventilation: bool,
    pub heating: bool,
    pub humidifier: bool,
    pub lighting: bool,
    pub timestamp: Timestamp,
}

impl ActuatorHistoryRecord {
    pub const fn new(state: &ActuatorState, timestamp: Timestamp) -> Self {
        Self {
            ventilation: state.ventilation,
            heating: state.heating,
            humidifier: state.humidifier,
            lighting: state.lighting,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_actuator_node_decodes() {
        let record: ActuatorsRecord = serde_json::from_value(json!({ "heating": true })).unwrap();
        assert!(record.state().heating);
        assert_eq!(record.mode(), ControlMode::Auto);

        let record: ActuatorsRecord = serde_json::from_value(json!({ "auto": false })).unwrap();
        assert_eq!(record.mode(), ControlMode::Manual);
    }

    #[test]
    fn test_history_record_keeps_store_field_names() {
        let record = SensorHistoryRecord::new(&SensorReadings::new(21.0, 80.0, 650.0), 42);
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value, json!({ "Temperature": 21.0, "Humidity": 80.0, "CO2": 650.0, "timestamp": 42 }));
    }
}
