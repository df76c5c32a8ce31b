//! Remote store seam
//!
//! The engine talks to the hierarchical key-value store only through
//! [`RemoteStore`]. Values are JSON trees addressed by `/`-separated paths,
//! matching the shape of push-based realtime databases.
//!
//! Change notifications are buffered by the store and drained by the engine
//! one at a time, so every notification is handled as its own discrete event.

mod memory;

pub use memory::MemoryStore;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde_json::Value;
use thiserror_no_std::Error;

/// Logical paths read and written by the engine
pub mod paths {
    /// Current sensor values
    pub const SENSORS: &str = "Sensors";
    /// Append-only sensor history, pruned by the retention job
    pub const SENSOR_HISTORY: &str = "Sensors/history";
    /// Current actuator booleans and the `auto` mode flag
    pub const ACTUATORS: &str = "Actuators";
    /// Append-only actuator snapshots
    pub const ACTUATOR_HISTORY: &str = "Actuators/history";
    /// Admin-tunable control ranges
    pub const RANGES: &str = "Ranges";
    /// Lighting schedule configuration
    pub const LIGHT_SCHEDULE: &str = "LightSchedule";
    /// Field of [`ACTUATORS`] holding the mode flag
    pub const AUTO_FIELD: &str = "auto";

    /// Every path the engine subscribes to at startup.
    pub const SUBSCRIBED: [&str; 4] = [SENSORS, ACTUATORS, RANGES, LIGHT_SCHEDULE];

    /// History nodes; writes under these never count as current-value updates
    pub const HISTORY: [&str; 2] = [SENSOR_HISTORY, ACTUATOR_HISTORY];
}

/// Key of a record created by [`RemoteStore::append`]
pub type RecordKey = String;

/// Join a parent path and a child key
pub fn child_path(parent: &str, key: &str) -> String {
    format!("{parent}/{key}")
}

/// `true` when `path` equals `ancestor` or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("remote store unavailable")]
    Unavailable,
    #[error("remote store rejected {operation} on {path}")]
    Rejected {
        operation: &'static str,
        path: String,
    },
    #[error("malformed record at {path}")]
    Malformed { path: String },
}

/// Notification that a subscribed path changed
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    /// The subscribed path
    pub path: String,
    /// The path that was actually written
    pub origin: String,
    /// Value of the subscribed path after the write
    pub value: Value,
}

impl StoreChange {
    /// `true` when the write landed in one of the append-only history nodes
    pub fn from_history_write(&self) -> bool {
        paths::HISTORY
            .iter()
            .any(|history| is_within(&self.origin, history))
    }
}

/// Hierarchical key-value store with change subscriptions
pub trait RemoteStore {
    /// Whether connectivity primitives exist at all.
    ///
    /// Checked once at startup to choose between live and simulated data.
    fn is_available(&self) -> bool;

    /// Point read. `Ok(None)` when nothing is stored at `path`.
    fn read(&mut self, path: &str) -> impl Future<Output = Result<Option<Value>, StoreError>>;

    /// Replace the subtree at `path`.
    fn write(&mut self, path: &str, value: Value) -> impl Future<Output = Result<(), StoreError>>;

    /// Insert `value` under a new, time-ordered key below `path`.
    fn append(
        &mut self,
        path: &str,
        value: Value,
    ) -> impl Future<Output = Result<RecordKey, StoreError>>;

    /// Children of `path` ordered ascending by their `order_by` field.
    ///
    /// With `limit_to_last`, only the last `n` children are returned.
    fn range_query(
        &mut self,
        path: &str,
        order_by: &str,
        limit_to_last: Option<usize>,
    ) -> impl Future<Output = Result<Vec<(RecordKey, Value)>, StoreError>>;

    /// Remove the subtree at `path`.
    fn delete(&mut self, path: &str) -> impl Future<Output = Result<(), StoreError>>;

    /// Register interest in changes at or below `path`.
    fn subscribe(&mut self, path: &str) -> impl Future<Output = Result<(), StoreError>>;

    /// Next buffered change notification, if any.
    fn try_next_change(&mut self) -> Option<StoreChange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within_respects_segments() {
        assert!(is_within("Sensors", "Sensors"));
        assert!(is_within("Sensors/history/k1", "Sensors"));
        assert!(!is_within("SensorsBackup", "Sensors"));
        assert!(!is_within("Sensors", "Sensors/history"));
    }

    #[test]
    fn test_history_writes_are_flagged() {
        let change = StoreChange {
            path: paths::SENSORS.into(),
            origin: child_path(paths::SENSOR_HISTORY, "k000000000001"),
            value: Value::Null,
        };
        assert!(change.from_history_write());

        let change = StoreChange {
            origin: paths::SENSORS.into(),
            ..change
        };
        assert!(!change.from_history_write());
    }
}
