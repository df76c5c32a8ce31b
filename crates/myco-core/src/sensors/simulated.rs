//! Self-driven sample source used when the remote store is unreachable

use alloc::vec::Vec;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{SensorReadings, SensorType};
use crate::Timestamp;
use crate::control::ActuatorState;

/// Temperature gain per tick while heating is on (°C)
const HEATING_EFFECT: f64 = 0.5;
/// Humidity gain per tick while the humidifier is on (% RH)
const HUMIDIFIER_EFFECT: f64 = 2.0;
/// CO₂ drop per tick while ventilation is on (ppm)
const VENTILATION_EFFECT: f64 = -30.0;

/// Half-width of the per-tick random step for each channel
const TEMPERATURE_STEP: f64 = 1.0;
const HUMIDITY_STEP: f64 = 1.5;
const CO2_STEP: f64 = 25.0;

/// Where new samples come from, chosen once at startup
pub enum SampleSource {
    /// Samples arrive as remote store change notifications
    Live,
    /// Samples are generated locally on every simulation tick
    Simulated(RandomWalk),
}

impl SampleSource {
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

/// Bounded random walk shifted by the active actuators
pub struct RandomWalk {
    rng: SmallRng,
}

impl RandomWalk {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Derive the next readings from `previous`.
    ///
    /// Each channel moves by a uniform step, then by the effect of the
    /// actuators that are on, then is clamped to its physical bounds.
    pub fn step(&mut self, previous: &SensorReadings, actuators: &ActuatorState) -> SensorReadings {
        let mut temperature =
            previous.temperature + self.rng.gen_range(-TEMPERATURE_STEP..TEMPERATURE_STEP);
        let mut humidity = previous.humidity + self.rng.gen_range(-HUMIDITY_STEP..HUMIDITY_STEP);
        let mut co2 = previous.co2 + self.rng.gen_range(-CO2_STEP..CO2_STEP);

        if actuators.heating {
            temperature += HEATING_EFFECT;
        }
        if actuators.humidifier {
            humidity += HUMIDIFIER_EFFECT;
        }
        if actuators.ventilation {
            co2 += VENTILATION_EFFECT;
        }

        SensorReadings::new(
            clamp_to(SensorType::Temperature, temperature),
            clamp_to(SensorType::Humidity, humidity),
            clamp_to(SensorType::Co2, co2),
        )
    }

    /// Generate `count` readings spaced `interval_ms` apart, the last one at `end`.
    ///
    /// The walk starts from the fallback values with every actuator off.
    pub fn warm_up(
        &mut self,
        count: usize,
        interval_ms: u64,
        end: Timestamp,
    ) -> Vec<(Timestamp, SensorReadings)> {
        let idle = ActuatorState::default();
        let start = end.saturating_sub(interval_ms.saturating_mul(count.saturating_sub(1) as u64));

        let mut previous = SensorReadings::fallback();
        (0..count)
            .map(|i| {
                previous = self.step(&previous, &idle);
                (start + i as u64 * interval_ms, previous)
            })
            .collect()
    }
}

fn clamp_to(sensor: SensorType, value: f64) -> f64 {
    let (min, max) = sensor.physical_bounds();
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_stays_within_physical_bounds() {
        let mut walk = RandomWalk::new(7);
        let all_on = ActuatorState {
            ventilation: true,
            heating: true,
            humidifier: true,
            lighting: true,
        };

        let mut readings = SensorReadings::new(34.9, 94.9, 301.0);
        for _ in 0..500 {
            readings = walk.step(&readings, &all_on);
            assert!((15.0..=35.0).contains(&readings.temperature));
            assert!((50.0..=95.0).contains(&readings.humidity));
            assert!((300.0..=2000.0).contains(&readings.co2));
        }
    }

    #[test]
    fn test_heating_pushes_temperature_up() {
        let mut walk = RandomWalk::new(1);
        let heating = ActuatorState {
            heating: true,
            ..ActuatorState::default()
        };

        // Drift is at most ±1.0 per tick, so 0.5 of bias dominates over many ticks.
        let mut readings = SensorReadings::new(20.0, 80.0, 800.0);
        for _ in 0..20 {
            readings = walk.step(&readings, &heating);
        }
        assert!(readings.temperature > 20.0);
    }

    #[test]
    fn test_warm_up_ends_at_requested_time() {
        let mut walk = RandomWalk::new(3);
        let history = walk.warm_up(24, 3_600_000, 100_000_000);

        assert_eq!(history.len(), 24);
        assert_eq!(history[23].0, 100_000_000);
        assert_eq!(history[0].0, 100_000_000 - 23 * 3_600_000);
        assert!(history.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
