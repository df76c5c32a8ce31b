//! Actuator state and the optimistic command ledger

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Actuators the client can observe and command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Ventilation,
    Heating,
    Humidifier,
    Lighting,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Self::Ventilation,
        Self::Heating,
        Self::Humidifier,
        Self::Lighting,
    ];

    /// Field name under `Actuators` in the remote store
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ventilation => "ventilation",
            Self::Heating => "heating",
            Self::Humidifier => "humidifier",
            Self::Lighting => "lighting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    const fn index(self) -> usize {
        match self {
            Self::Ventilation => 0,
            Self::Heating => 1,
            Self::Humidifier => 2,
            Self::Lighting => 3,
        }
    }
}

/// On/off state of every actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub ventilation: bool,
    pub heating: bool,
    pub humidifier: bool,
    pub lighting: bool,
}

impl ActuatorState {
    pub const fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Ventilation => self.ventilation,
            Actuator::Heating => self.heating,
            Actuator::Humidifier => self.humidifier,
            Actuator::Lighting => self.lighting,
        }
    }

    pub const fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Ventilation => self.ventilation = on,
            Actuator::Heating => self.heating = on,
            Actuator::Humidifier => self.humidifier = on,
            Actuator::Lighting => self.lighting = on,
        }
    }
}

/// Value of one actuator as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorValue {
    /// Reported by the remote store
    Confirmed(bool),
    /// Applied locally by a command the store has not echoed yet
    Optimistic {
        value: bool,
        previous: bool,
        issued_at: Timestamp,
    },
}

impl ActuatorValue {
    pub const fn effective(&self) -> bool {
        match *self {
            Self::Confirmed(value) | Self::Optimistic { value, .. } => value,
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Optimistic { .. })
    }
}

/// Per-actuator record reconciling local commands with remote reports
///
/// Remote reports always win. An optimistic value that is neither confirmed
/// nor contradicted falls back to its previous confirmed value once it is
/// older than the optimistic timeout.
#[derive(Debug, Clone)]
pub struct ActuatorLedger {
    slots: [ActuatorValue; 4],
}

impl Default for ActuatorLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorLedger {
    pub const fn new() -> Self {
        Self {
            slots: [ActuatorValue::Confirmed(false); 4],
        }
    }

    pub const fn get(&self, actuator: Actuator) -> ActuatorValue {
        self.slots[actuator.index()]
    }

    /// Effective on/off state of every actuator
    pub fn state(&self) -> ActuatorState {
        let mut state = ActuatorState::default();
        for actuator in Actuator::ALL {
            state.set(actuator, self.get(actuator).effective());
        }
        state
    }

    pub fn apply_optimistic(&mut self, actuator: Actuator, value: bool, now: Timestamp) {
        let previous = match self.slots[actuator.index()] {
            ActuatorValue::Confirmed(v) | ActuatorValue::Optimistic { previous: v, .. } => v,
        };
        self.slots[actuator.index()] = ActuatorValue::Optimistic {
            value,
            previous,
            issued_at: now,
        };
    }

    /// Record a value that needs no remote echo.
    pub fn confirm(&mut self, actuator: Actuator, value: bool) {
        self.slots[actuator.index()] = ActuatorValue::Confirmed(value);
    }

    /// Undo a pending command, restoring the last confirmed value.
    pub fn revert(&mut self, actuator: Actuator) {
        if let ActuatorValue::Optimistic { previous, .. } = self.slots[actuator.index()] {
            self.slots[actuator.index()] = ActuatorValue::Confirmed(previous);
        }
    }

    /// Adopt a full remote report.
    ///
    /// Returns the actuators whose effective value changed.
    pub fn confirm_all(&mut self, remote: &ActuatorState) -> Vec<Actuator, 4> {
        let mut changed = Vec::new();
        for actuator in Actuator::ALL {
            let before = self.get(actuator).effective();
            let value = remote.get(actuator);
            self.slots[actuator.index()] = ActuatorValue::Confirmed(value);
            if before != value {
                let _ = changed.push(actuator);
            }
        }
        changed
    }

    /// Revert optimistic values issued more than `timeout_ms` before `now`.
    ///
    /// Returns the actuators that were reverted.
    pub fn expire(&mut self, now: Timestamp, timeout_ms: u64) -> Vec<Actuator, 4> {
        let mut reverted = Vec::new();
        for actuator in Actuator::ALL {
            if let ActuatorValue::Optimistic { issued_at, .. } = self.get(actuator)
                && now.saturating_sub(issued_at) >= timeout_ms
            {
                self.revert(actuator);
                let _ = reverted.push(actuator);
            }
        }
        reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for actuator in Actuator::ALL {
            assert_eq!(Actuator::from_name(actuator.name()), Some(actuator));
        }
        assert_eq!(Actuator::from_name("sprinkler"), None);
    }

    #[test]
    fn test_optimistic_value_is_effective_until_confirmed() {
        let mut ledger = ActuatorLedger::new();
        ledger.apply_optimistic(Actuator::Heating, true, 1_000);

        assert!(ledger.state().heating);
        assert!(ledger.get(Actuator::Heating).is_pending());

        let remote = ActuatorState {
            heating: true,
            ..ActuatorState::default()
        };
        let changed = ledger.confirm_all(&remote);
        assert!(changed.is_empty());
        assert_eq!(ledger.get(Actuator::Heating), ActuatorValue::Confirmed(true));
    }

    #[test]
    fn test_remote_wins_over_optimistic() {
        let mut ledger = ActuatorLedger::new();
        ledger.apply_optimistic(Actuator::Lighting, true, 1_000);

        let changed = ledger.confirm_all(&ActuatorState::default());
        assert_eq!(changed.as_slice(), &[Actuator::Lighting]);
        assert!(!ledger.state().lighting);
    }

    #[test]
    fn test_unconfirmed_command_times_out() {
        let mut ledger = ActuatorLedger::new();
        ledger.confirm(Actuator::Ventilation, true);
        ledger.apply_optimistic(Actuator::Ventilation, false, 1_000);
        ledger.apply_optimistic(Actuator::Ventilation, true, 2_000);
        ledger.apply_optimistic(Actuator::Ventilation, false, 3_000);

        assert!(ledger.expire(10_000, 15_000).is_empty());
        let reverted = ledger.expire(18_000, 15_000);
        assert_eq!(reverted.as_slice(), &[Actuator::Ventilation]);
        // Falls back to the last value the store confirmed.
        assert_eq!(ledger.get(Actuator::Ventilation), ActuatorValue::Confirmed(true));
    }
}
