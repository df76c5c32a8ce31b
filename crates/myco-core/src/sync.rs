//! Merging the history snapshot with the live update stream

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use log::{debug, warn};
use serde_json::Value;

use crate::Timestamp;
use crate::sensors::{SensorReadings, SensorType};
use crate::storage::{Sample, SensorHistoryRecord, SeriesSet};
use crate::store::RecordKey;

/// Decode raw history children, dropping the ones that do not parse.
pub fn decode_snapshot(records: Vec<(RecordKey, Value)>) -> Vec<(RecordKey, SensorHistoryRecord)> {
    records
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(record) => Some((key, record)),
            Err(_) => {
                warn!("Skipping malformed history record {}", key);
                None
            }
        })
        .collect()
}

/// Turns one snapshot read and any number of live updates into a single
/// ordered series per channel.
///
/// `has_live_data` guards against the live subscription racing ahead of
/// the snapshot: once a live sample landed, the snapshot is merged in
/// instead of replacing the buffers.
#[derive(Debug, Clone, Default)]
pub struct SyncReconciler {
    has_live_data: bool,
    seen: BTreeSet<RecordKey>,
}

impl SyncReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn has_live_data(&self) -> bool {
        self.has_live_data
    }

    /// Load a history snapshot into `series`.
    ///
    /// Returns how many records were inserted.
    pub fn ingest_snapshot(
        &mut self,
        series: &mut SeriesSet,
        records: &[(RecordKey, SensorHistoryRecord)],
    ) -> usize {
        if !self.has_live_data {
            series.clear();
            self.seen.clear();
        }

        let fresh: Vec<&SensorHistoryRecord> = records
            .iter()
            .filter(|(key, _)| self.seen.insert(key.clone()))
            .map(|(_, record)| record)
            .collect();

        for sensor in SensorType::ALL {
            let buffer = series.get_mut(sensor);
            buffer.extend_sorted(
                fresh
                    .iter()
                    .map(|r| Sample::new(r.timestamp, r.readings().get(sensor))),
            );
            buffer.evict_if_over_capacity();
        }

        debug!(
            "Snapshot: {} of {} records inserted (live data first: {})",
            fresh.len(),
            records.len(),
            self.has_live_data
        );
        fresh.len()
    }

    /// Append one live update stamped with its local receipt time.
    pub fn ingest_live(
        &mut self,
        series: &mut SeriesSet,
        readings: &SensorReadings,
        received_at: Timestamp,
    ) {
        self.has_live_data = true;
        series.push_readings(received_at, readings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use serde_json::json;

    fn record(key: u32, ts: Timestamp, temperature: f64) -> (RecordKey, SensorHistoryRecord) {
        (
            format!("k{key:03}"),
            SensorHistoryRecord {
                temperature,
                humidity: 80.0,
                co2: 800.0,
                timestamp: ts,
            },
        )
    }

    fn temperatures(series: &SeriesSet) -> Vec<(Timestamp, f64)> {
        series
            .get(SensorType::Temperature)
            .iter()
            .map(|s| (s.timestamp, s.value))
            .collect()
    }

    #[test]
    fn test_loading_same_snapshot_twice_is_idempotent() {
        let snapshot = [record(1, 10, 20.0), record(2, 20, 21.0), record(3, 30, 22.0)];

        let mut once = SeriesSet::new(1440);
        SyncReconciler::new().ingest_snapshot(&mut once, &snapshot);

        let mut twice = SeriesSet::new(1440);
        let mut reconciler = SyncReconciler::new();
        reconciler.ingest_snapshot(&mut twice, &snapshot);
        reconciler.ingest_snapshot(&mut twice, &snapshot);

        assert_eq!(temperatures(&once), temperatures(&twice));
        assert_eq!(twice.get(SensorType::Co2).len(), 3);
    }

    #[test]
    fn test_live_data_before_snapshot_is_kept_and_interleaved() {
        let mut series = SeriesSet::new(1440);
        let mut reconciler = SyncReconciler::new();

        reconciler.ingest_live(&mut series, &SensorReadings::new(25.0, 82.0, 700.0), 25);
        let inserted = reconciler.ingest_snapshot(&mut series, &[record(1, 10, 20.0), record(2, 30, 22.0)]);

        assert_eq!(inserted, 2);
        assert_eq!(temperatures(&series), [(10, 20.0), (25, 25.0), (30, 22.0)]);
    }

    #[test]
    fn test_snapshot_after_live_skips_known_keys() {
        let mut series = SeriesSet::new(1440);
        let mut reconciler = SyncReconciler::new();
        reconciler.ingest_snapshot(&mut series, &[record(1, 10, 20.0)]);
        reconciler.ingest_live(&mut series, &SensorReadings::new(25.0, 82.0, 700.0), 40);

        let inserted =
            reconciler.ingest_snapshot(&mut series, &[record(1, 10, 20.0), record(2, 30, 22.0)]);
        assert_eq!(inserted, 1);
        assert_eq!(series.get(SensorType::Temperature).len(), 3);
    }

    #[test]
    fn test_snapshot_respects_live_ceiling() {
        let mut series = SeriesSet::new(24);
        let snapshot: Vec<_> = (0..100).map(|i| record(i, i as u64, i as f64)).collect();
        SyncReconciler::new().ingest_snapshot(&mut series, &snapshot);

        let buffer = series.get(SensorType::Temperature);
        assert_eq!(buffer.len(), 24);
        assert_eq!(buffer.latest().timestamp, 99);
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let decoded = decode_snapshot(alloc::vec![
            ("a".into(), json!({ "Temperature": 21.0, "Humidity": 80.0, "CO2": 600.0, "timestamp": 5 })),
            ("b".into(), json!({ "Temperature": "warm" })),
        ]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "a");
    }
}
