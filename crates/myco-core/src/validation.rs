//! Validation of admin-submitted control ranges and lighting schedules
//!
//! Every rule is checked and every violation is reported together. Only a
//! [`Validated`] value can be handed to persistence, so a partially checked
//! configuration never reaches the store.

use core::fmt;
use core::ops::Deref;

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Absolute temperature bounds for control ranges (°C)
const TEMP_BOUNDS: (f64, f64) = (15.0, 35.0);
/// Absolute humidity bounds for control ranges (% RH)
const HUM_BOUNDS: (f64, f64) = (50.0, 95.0);
/// Allowed humidity extractor trigger (% RH)
const EXTRACTOR_BOUNDS: (f64, f64) = (80.0, 95.0);
/// Allowed length of either phase of a light cycle (hours)
const CYCLE_PHASE_HOURS: (u8, u8) = (1, 24);
/// Longest allowed full light cycle (hours)
const CYCLE_MAX_TOTAL_HOURS: u16 = 48;

/// Most violations any single submission can produce
pub const MAX_VIOLATIONS: usize = 8;

/// Thresholds the automatic controller works with
///
/// Independent from the alert bands in [`crate::sensors::SensorRanges`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRanges {
    pub temp_min: f64,
    pub temp_max: f64,
    pub hum_min: f64,
    pub hum_max: f64,
    pub hum_extractor_min: f64,
}

impl Default for ControlRanges {
    fn default() -> Self {
        Self {
            temp_min: 18.0,
            temp_max: 28.0,
            hum_min: 70.0,
            hum_max: 90.0,
            hum_extractor_min: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    /// Lighting is switched by hand
    #[default]
    Manual,
    /// On between two times of day
    Schedule,
    /// Alternating on/off phases
    Cycle,
}

/// Daily on-window; a start after the end spans midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWindow {
    pub start_hour: u8,
    pub start_min: u8,
    pub end_hour: u8,
    pub end_min: u8,
}

impl DailyWindow {
    pub const fn start_minutes(&self) -> u16 {
        self.start_hour as u16 * 60 + self.start_min as u16
    }

    pub const fn end_minutes(&self) -> u16 {
        self.end_hour as u16 * 60 + self.end_min as u16
    }

    const fn fields_in_range(&self) -> bool {
        self.start_hour < 24 && self.end_hour < 24 && self.start_min < 60 && self.end_min < 60
    }
}

impl Default for DailyWindow {
    fn default() -> Self {
        Self {
            start_hour: 8,
            start_min: 0,
            end_hour: 20,
            end_min: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightCycle {
    pub on_hours: u8,
    pub off_hours: u8,
}

impl Default for LightCycle {
    fn default() -> Self {
        Self {
            on_hours: 12,
            off_hours: 12,
        }
    }
}

/// Lighting configuration stored at `LightSchedule`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightSchedule {
    pub mode: LightMode,
    pub schedule: DailyWindow,
    pub cycle: LightCycle,
}

/// A single broken rule
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("tempMin must be less than tempMax")]
    TempOrder,
    #[error("humMin must be less than humMax")]
    HumOrder,
    #[error("temperature range must stay within 15-35 °C")]
    TempBounds,
    #[error("humidity range must stay within 50-95 %")]
    HumBounds,
    #[error("humExtractorMin must be within 80-95 %")]
    ExtractorBounds,
    #[error("schedule hours must be 0-23 and minutes 0-59")]
    ScheduleTimeInvalid,
    #[error("schedule start and end times must differ")]
    ScheduleEmptyWindow,
    #[error("onHours must be within 1-24")]
    CycleOnHours,
    #[error("offHours must be within 1-24")]
    CycleOffHours,
    #[error("onHours + offHours must not exceed 48")]
    CycleTooLong,
}

/// Every violation found in one submission
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    violations: Vec<Violation, MAX_VIOLATIONS>,
}

impl ValidationError {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn contains(&self, violation: Violation) -> bool {
        self.violations.contains(&violation)
    }

    fn push(&mut self, violation: Violation) {
        let _ = self.violations.push(violation);
    }

    fn into_result<T>(self, value: T) -> Result<Validated<T>, Self> {
        if self.violations.is_empty() {
            Ok(Validated(value))
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration: ")?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl core::error::Error for ValidationError {}

/// A configuration that passed every rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validated<T>(T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Validated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub fn validate_ranges(ranges: ControlRanges) -> Result<Validated<ControlRanges>, ValidationError> {
    let mut errors = ValidationError::default();

    if ranges.temp_min >= ranges.temp_max {
        errors.push(Violation::TempOrder);
    }
    if ranges.hum_min >= ranges.hum_max {
        errors.push(Violation::HumOrder);
    }
    if !(TEMP_BOUNDS.0..).contains(&ranges.temp_min) || !(..=TEMP_BOUNDS.1).contains(&ranges.temp_max)
    {
        errors.push(Violation::TempBounds);
    }
    if !(HUM_BOUNDS.0..).contains(&ranges.hum_min) || !(..=HUM_BOUNDS.1).contains(&ranges.hum_max) {
        errors.push(Violation::HumBounds);
    }
    if !(EXTRACTOR_BOUNDS.0..=EXTRACTOR_BOUNDS.1).contains(&ranges.hum_extractor_min) {
        errors.push(Violation::ExtractorBounds);
    }

    errors.into_result(ranges)
}

pub fn validate_light_schedule(
    schedule: LightSchedule,
) -> Result<Validated<LightSchedule>, ValidationError> {
    let mut errors = ValidationError::default();

    match schedule.mode {
        LightMode::Manual => {}
        LightMode::Schedule => {
            let window = &schedule.schedule;
            if !window.fields_in_range() {
                errors.push(Violation::ScheduleTimeInvalid);
            }
            if window.start_minutes() == window.end_minutes() {
                errors.push(Violation::ScheduleEmptyWindow);
            }
        }
        LightMode::Cycle => {
            let cycle = &schedule.cycle;
            let phase = CYCLE_PHASE_HOURS.0..=CYCLE_PHASE_HOURS.1;
            if !phase.contains(&cycle.on_hours) {
                errors.push(Violation::CycleOnHours);
            }
            if !phase.contains(&cycle.off_hours) {
                errors.push(Violation::CycleOffHours);
            }
            if cycle.on_hours as u16 + cycle.off_hours as u16 > CYCLE_MAX_TOTAL_HOURS {
                errors.push(Violation::CycleTooLong);
            }
        }
    }

    errors.into_result(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(temp_min: f64, temp_max: f64, hum_min: f64, hum_max: f64, ext: f64) -> ControlRanges {
        ControlRanges {
            temp_min,
            temp_max,
            hum_min,
            hum_max,
            hum_extractor_min: ext,
        }
    }

    fn cycle(on_hours: u8, off_hours: u8) -> LightSchedule {
        LightSchedule {
            mode: LightMode::Cycle,
            cycle: LightCycle {
                on_hours,
                off_hours,
            },
            ..LightSchedule::default()
        }
    }

    #[test]
    fn test_valid_ranges_pass() {
        let validated = validate_ranges(ranges(23.0, 28.0, 80.0, 90.0, 90.0)).unwrap();
        assert_eq!(validated.temp_min, 23.0);
        assert!(validate_ranges(ControlRanges::default()).is_ok());
    }

    #[test]
    fn test_inverted_temperature_is_reported() {
        let err = validate_ranges(ranges(28.0, 23.0, 80.0, 90.0, 90.0)).unwrap_err();
        assert!(err.contains(Violation::TempOrder));
        assert_eq!(
            alloc::format!("{}", Violation::TempOrder),
            "tempMin must be less than tempMax"
        );
    }

    #[test]
    fn test_all_range_violations_reported_together() {
        let err = validate_ranges(ranges(10.0, 5.0, 45.0, 40.0, 50.0)).unwrap_err();
        assert_eq!(
            err.violations(),
            &[
                Violation::TempOrder,
                Violation::HumOrder,
                Violation::TempBounds,
                Violation::HumBounds,
                Violation::ExtractorBounds,
            ]
        );
    }

    #[test]
    fn test_nan_bound_is_rejected() {
        let err = validate_ranges(ranges(f64::NAN, 28.0, 80.0, 90.0, 90.0)).unwrap_err();
        assert!(err.contains(Violation::TempBounds));
    }

    #[test]
    fn test_cycle_rules() {
        let err = validate_light_schedule(cycle(30, 20)).unwrap_err();
        assert!(err.contains(Violation::CycleTooLong));
        assert!(err.contains(Violation::CycleOnHours));

        assert!(validate_light_schedule(cycle(12, 12)).is_ok());
        assert!(validate_light_schedule(cycle(0, 12)).is_err());
    }

    #[test]
    fn test_schedule_window_rules() {
        let mut schedule = LightSchedule {
            mode: LightMode::Schedule,
            ..LightSchedule::default()
        };

        // Overnight windows are legal.
        schedule.schedule = DailyWindow {
            start_hour: 22,
            start_min: 0,
            end_hour: 6,
            end_min: 30,
        };
        assert!(validate_light_schedule(schedule).is_ok());

        schedule.schedule.end_hour = 22;
        schedule.schedule.end_min = 0;
        let err = validate_light_schedule(schedule).unwrap_err();
        assert_eq!(err.violations(), &[Violation::ScheduleEmptyWindow]);
    }

    #[test]
    fn test_manual_mode_ignores_numbers() {
        let schedule = LightSchedule {
            mode: LightMode::Manual,
            cycle: LightCycle {
                on_hours: 99,
                off_hours: 0,
            },
            ..LightSchedule::default()
        };
        assert!(validate_light_schedule(schedule).is_ok());
    }

    #[test]
    fn test_ranges_use_store_field_names() {
        let value = serde_json::to_value(ControlRanges::default()).unwrap();
        assert_eq!(value["humExtractorMin"], 90.0);
        assert_eq!(value["tempMin"], 18.0);
    }
}
