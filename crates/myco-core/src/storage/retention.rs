//! Periodic persist-and-prune job for the remote sensor history

use alloc::vec::Vec;

use embassy_time::Duration;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::records::{ActuatorHistoryRecord, ActuatorsRecord, SensorHistoryRecord};
use crate::Timestamp;
use crate::sensors::SensorReadings;
use crate::store::{RemoteStore, StoreError, child_path, paths};

/// Which part of a retention cycle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionStep {
    SaveSensors,
    SaveActuators,
    Prune,
}

impl RetentionStep {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SaveSensors => "saving sensor history",
            Self::SaveActuators => "saving actuator history",
            Self::Prune => "pruning sensor history",
        }
    }
}

/// A record dropped from this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    pub step: RetentionStep,
    pub error: StoreError,
}

/// Outcome of one retention cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub sensors_saved: bool,
    pub actuators_saved: bool,
    /// History records deleted to get back under the persisted ceiling
    pub pruned: usize,
    pub failures: Vec<PersistenceFailure>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, step: RetentionStep, error: StoreError) {
        error!("Retention: {} failed: {}", step.label(), error);
        self.failures.push(PersistenceFailure { step, error });
    }
}

/// Copies the current sensor and actuator values into the append-only
/// history nodes, then deletes the oldest sensor records above the
/// persisted ceiling.
///
/// A failed step never aborts the cycle. The record in question is dropped
/// and the next cycle tries again on its own.
#[derive(Debug, Clone)]
pub struct HistoryRetentionJob {
    persisted_ceiling: usize,
    interval: Duration,
    last_run: Option<Timestamp>,
}

impl HistoryRetentionJob {
    pub const fn new(persisted_ceiling: usize, interval: Duration) -> Self {
        Self {
            persisted_ceiling,
            interval,
            last_run: None,
        }
    }

    pub const fn persisted_ceiling(&self) -> usize {
        self.persisted_ceiling
    }

    pub const fn last_run(&self) -> Option<Timestamp> {
        self.last_run
    }

    /// The first cycle is due one interval after `started_at`.
    pub fn arm(&mut self, started_at: Timestamp) {
        self.last_run = Some(started_at);
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.last_run {
            Some(last) => now.saturating_sub(last) >= self.interval.as_millis(),
            None => true,
        }
    }

    pub async fn run<S: RemoteStore>(&mut self, store: &mut S, now: Timestamp) -> RetentionReport {
        self.last_run = Some(now);
        let mut report = RetentionReport::default();

        match read_record::<S, SensorReadings>(store, paths::SENSORS).await {
            Ok(Some(readings)) => {
                let record = SensorHistoryRecord::new(&readings, now);
                match append_record(store, paths::SENSOR_HISTORY, &record).await {
                    Ok(()) => report.sensors_saved = true,
                    Err(e) => report.fail(RetentionStep::SaveSensors, e),
                }
            }
            Ok(None) => debug!("Retention: no current sensor values to save"),
            Err(e) => report.fail(RetentionStep::SaveSensors, e),
        }

        match read_record::<S, ActuatorsRecord>(store, paths::ACTUATORS).await {
            Ok(Some(actuators)) => {
                let record = ActuatorHistoryRecord::new(&actuators.state(), now);
                match append_record(store, paths::ACTUATOR_HISTORY, &record).await {
                    Ok(()) => report.actuators_saved = true,
                    Err(e) => report.fail(RetentionStep::SaveActuators, e),
                }
            }
            Ok(None) => debug!("Retention: no current actuator values to save"),
            Err(e) => report.fail(RetentionStep::SaveActuators, e),
        }

        self.prune(store, &mut report).await;

        if report.is_clean() {
            info!("Retention: cycle complete, {} record(s) pruned", report.pruned);
        }
        report
    }

    async fn prune<S: RemoteStore>(&self, store: &mut S, report: &mut RetentionReport) {
        let records = match store
            .range_query(paths::SENSOR_HISTORY, "timestamp", None)
            .await
        {
            Ok(records) => records,
            Err(e) => return report.fail(RetentionStep::Prune, e),
        };

        let excess = records.len().saturating_sub(self.persisted_ceiling);
        if excess == 0 {
            return;
        }

        debug!(
            "Retention: {} records stored, pruning {} down to {}",
            records.len(),
            excess,
            self.persisted_ceiling
        );
        for (key, _) in records.into_iter().take(excess) {
            match store.delete(&child_path(paths::SENSOR_HISTORY, &key)).await {
                Ok(()) => report.pruned += 1,
                Err(e) => report.fail(RetentionStep::Prune, e),
            }
        }
    }
}

async fn read_record<S: RemoteStore, T: DeserializeOwned>(
    store: &mut S,
    path: &str,
) -> Result<Option<T>, StoreError> {
    let Some(value) = store.read(path).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|_| StoreError::Malformed { path: path.into() })
}

pub(crate) async fn append_record<S: RemoteStore, T: serde::Serialize>(
    store: &mut S,
    path: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value: Value =
        serde_json::to_value(record).map_err(|_| StoreError::Malformed { path: path.into() })?;
    store.append(path, value).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use embassy_futures::block_on;
    use serde_json::json;

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        block_on(store.write(
            paths::SENSORS,
            json!({ "Temperature": 22.5, "Humidity": 81.0, "CO2": 640.0 }),
        ))
        .unwrap();
        block_on(store.write(
            paths::ACTUATORS,
            json!({ "ventilation": false, "heating": true, "humidifier": false, "lighting": true, "auto": true }),
        ))
        .unwrap();
        store
    }

    #[test]
    fn test_run_persists_current_values() {
        let mut store = seeded_store();
        let mut job = HistoryRetentionJob::new(1000, Duration::from_secs(60));

        let report = block_on(job.run(&mut store, 5_000));
        assert!(report.is_clean());
        assert!(report.sensors_saved && report.actuators_saved);

        let saved = block_on(store.range_query(paths::SENSOR_HISTORY, "timestamp", None)).unwrap();
        let record: SensorHistoryRecord = serde_json::from_value(saved[0].1.clone()).unwrap();
        assert_eq!(record.timestamp, 5_000);
        assert_eq!(record.co2, 640.0);

        let actuators = block_on(store.range_query(paths::ACTUATOR_HISTORY, "timestamp", None)).unwrap();
        assert_eq!(actuators[0].1["heating"], json!(true));
    }

    #[test]
    fn test_prunes_oldest_records_down_to_ceiling() {
        let mut store = seeded_store();
        for ts in 1..=5u64 {
            block_on(store.append(paths::SENSOR_HISTORY, json!({ "Temperature": 20.0, "Humidity": 80.0, "CO2": 600.0, "timestamp": ts }))).unwrap();
        }

        let mut job = HistoryRetentionJob::new(3, Duration::from_secs(60));
        let report = block_on(job.run(&mut store, 100));

        // Five seeded plus the one just saved.
        assert_eq!(report.pruned, 3);
        let left = block_on(store.range_query(paths::SENSOR_HISTORY, "timestamp", None)).unwrap();
        let stamps: Vec<u64> = left.iter().map(|(_, v)| v["timestamp"].as_u64().unwrap()).collect();
        assert_eq!(stamps, [4, 5, 100]);
    }

    #[test]
    fn test_failed_save_is_reported_and_cycle_continues() {
        let mut store = seeded_store();
        store.fail_under(paths::SENSOR_HISTORY);
        let mut job = HistoryRetentionJob::new(1000, Duration::from_secs(60));

        let report = block_on(job.run(&mut store, 100));
        assert!(!report.sensors_saved);
        assert!(report.actuators_saved);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].step, RetentionStep::SaveSensors);
        assert_eq!(report.failures[1].step, RetentionStep::Prune);

        // Next cycle recovers on its own.
        store.clear_failures();
        let report = block_on(job.run(&mut store, 60_100));
        assert!(report.is_clean());
    }

    #[test]
    fn test_schedule() {
        let mut job = HistoryRetentionJob::new(1000, Duration::from_secs(60));
        assert!(job.is_due(0));
        job.arm(1_000);
        assert!(!job.is_due(30_000));
        assert!(job.is_due(61_000));
    }
}
