//! Threshold alerts and the bounded alert backlog

use core::fmt::{self, Write};

use heapless::{Deque, String, Vec};
use log::{info, warn};

use crate::Timestamp;
use crate::control::{Actuator, ControlMode};
use crate::sensors::{SensorRanges, SensorReadings, SensorStatus, SensorType};

/// Maximum number of alerts kept in the backlog
pub const ALERT_BACKLOG: usize = 5;

/// Longest alert message; longer text is truncated
pub const ALERT_MESSAGE_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Danger,
    Success,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: u32,
    pub message: String<ALERT_MESSAGE_LEN>,
    pub severity: Severity,
    pub created_at: Timestamp,
}

/// Derives alerts from readings and control events and keeps the backlog
///
/// The backlog holds at most [`ALERT_BACKLOG`] entries, newest first. A new
/// alert on a full backlog pushes the oldest out. Independently of that,
/// every alert is dropped once it is older than the TTL.
pub struct AlertEngine {
    ranges: SensorRanges,
    ttl_ms: u64,
    backlog: Deque<Alert, ALERT_BACKLOG>,
    next_id: u32,
}

impl AlertEngine {
    pub fn new(ranges: SensorRanges, ttl_ms: u64) -> Self {
        Self {
            ranges,
            ttl_ms,
            backlog: Deque::new(),
            next_id: 0,
        }
    }

    pub const fn ranges(&self) -> &SensorRanges {
        &self.ranges
    }

    /// Compare every channel against its band.
    ///
    /// Below the band raises a warning, above it raises a danger alert.
    pub fn evaluate_readings(
        &mut self,
        readings: &SensorReadings,
        now: Timestamp,
    ) -> Vec<Alert, 3> {
        let mut raised = Vec::new();
        for sensor in SensorType::ALL {
            let value = readings.get(sensor);
            let status = self.ranges.get(sensor).classify(value);
            let severity = match status {
                SensorStatus::Normal => continue,
                SensorStatus::Low => Severity::Warning,
                SensorStatus::High => Severity::Danger,
            };
            let alert = self.raise_fmt(
                severity,
                now,
                format_args!(
                    "{} {}: {:.1} {}",
                    sensor.label(),
                    status.label(),
                    value,
                    sensor.unit()
                ),
            );
            let _ = raised.push(alert);
        }
        raised
    }

    /// Informational alert for an actuator that switched.
    pub fn evaluate_actuator(&mut self, actuator: Actuator, on: bool, now: Timestamp) -> Alert {
        let (severity, verb) = if on {
            (Severity::Success, "activated")
        } else {
            (Severity::Info, "deactivated")
        };
        self.raise_fmt(severity, now, format_args!("{} {}", actuator.name(), verb))
    }

    pub fn mode_changed(&mut self, mode: ControlMode, now: Timestamp) -> Alert {
        self.raise_fmt(
            Severity::Info,
            now,
            format_args!("control mode set to {}", mode.label()),
        )
    }

    pub fn raise(&mut self, severity: Severity, message: &str, now: Timestamp) -> Alert {
        self.raise_fmt(severity, now, format_args!("{message}"))
    }

    fn raise_fmt(
        &mut self,
        severity: Severity,
        now: Timestamp,
        message: core::fmt::Arguments<'_>,
    ) -> Alert {
        let mut text = String::new();
        let _ = Truncating::new(&mut text).write_fmt(message);

        self.next_id = self.next_id.wrapping_add(1);
        let alert = Alert {
            id: self.next_id,
            message: text,
            severity,
            created_at: now,
        };

        match severity {
            Severity::Warning | Severity::Danger => warn!("Alert: {}", alert.message),
            Severity::Info | Severity::Success => info!("Alert: {}", alert.message),
        }

        if self.backlog.is_full() {
            self.backlog.pop_back();
        }
        let _ = self.backlog.push_front(alert.clone());
        alert
    }

    /// Drop alerts older than the TTL. Returns how many were removed.
    pub fn expire(&mut self, now: Timestamp) -> usize {
        let before = self.backlog.len();
        let mut kept = Deque::new();
        while let Some(alert) = self.backlog.pop_front() {
            if now.saturating_sub(alert.created_at) < self.ttl_ms {
                let _ = kept.push_back(alert);
            }
        }
        self.backlog = kept;
        before - self.backlog.len()
    }

    /// Current backlog, newest first
    pub fn backlog(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.backlog.iter()
    }

    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }
}

/// Writes as much of the formatted text as fits, cut at a char boundary.
struct Truncating<'a> {
    text: &'a mut String<ALERT_MESSAGE_LEN>,
    full: bool,
}

impl<'a> Truncating<'a> {
    fn new(text: &'a mut String<ALERT_MESSAGE_LEN>) -> Self {
        Self { text, full: false }
    }
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.full {
                break;
            }
            self.full = self.text.push(c).is_err();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AlertEngine {
        AlertEngine::new(SensorRanges::default(), 10_000)
    }

    #[test]
    fn test_low_temperature_raises_single_warning() {
        let mut alerts = engine();
        let raised = alerts.evaluate_readings(&SensorReadings::new(15.0, 85.0, 900.0), 0);

        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::Warning);
        assert!(raised[0].message.contains("Temperature low"));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_high_values_raise_danger() {
        let mut alerts = engine();
        let raised = alerts.evaluate_readings(&SensorReadings::new(30.0, 95.0, 1500.0), 0);
        assert_eq!(raised.len(), 3);
        assert!(raised.iter().all(|a| a.severity == Severity::Danger));
        assert!(raised[2].message.contains("CO2 high"));
    }

    #[test]
    fn test_in_range_raises_nothing() {
        let mut alerts = engine();
        assert!(alerts.evaluate_readings(&SensorReadings::fallback(), 0).is_empty());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_backlog_keeps_five_newest_first() {
        let mut alerts = engine();
        for i in 0..7 {
            alerts.raise(Severity::Info, "tick", i);
        }

        let stamps: alloc::vec::Vec<Timestamp> = alerts.backlog().map(|a| a.created_at).collect();
        assert_eq!(stamps, [6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_alerts_expire_by_age_alone() {
        let mut alerts = engine();
        alerts.raise(Severity::Info, "old", 0);
        alerts.raise(Severity::Info, "new", 8_000);

        assert_eq!(alerts.expire(9_999), 0);
        assert_eq!(alerts.expire(10_000), 1);
        assert_eq!(alerts.backlog().next().map(|a| a.message.as_str()), Some("new"));
    }

    #[test]
    fn test_long_message_is_truncated_not_dropped() {
        let mut alerts = engine();
        let long = "é".repeat(60);
        let alert = alerts.raise(Severity::Warning, &long, 0);

        assert_eq!(alert.message.chars().count(), ALERT_MESSAGE_LEN / 2);
        assert!(long.starts_with(alert.message.as_str()));
    }

    #[test]
    fn test_actuator_and_mode_alerts() {
        let mut alerts = engine();
        assert_eq!(alerts.evaluate_actuator(Actuator::Heating, true, 0).severity, Severity::Success);
        let off = alerts.evaluate_actuator(Actuator::Heating, false, 0);
        assert_eq!(off.severity, Severity::Info);
        assert_eq!(off.message.as_str(), "heating deactivated");
        assert_eq!(alerts.mode_changed(ControlMode::Manual, 0).message.as_str(), "control mode set to manual");
    }
}
