//! Startup, change handling and the periodic tick

use alloc::format;

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{AppError, ConfigKind, Engine, EngineEvent, EngineRunState};
use crate::Timestamp;
use crate::alerts::Severity;
use crate::control::IdentityProvider;
use crate::sensors::{RandomWalk, SampleSource, SensorReadings};
use crate::storage::{ActuatorsRecord, SeriesSet};
use crate::store::{RemoteStore, StoreChange, StoreError, paths};
use crate::sync::decode_snapshot;
use crate::validation::{ControlRanges, LightSchedule};

impl<S: RemoteStore, I: IdentityProvider> Engine<'_, S, I> {
    /// Connect to the store and load the history snapshot.
    ///
    /// Falls back to simulated data when the store is unavailable. Never
    /// fails: every problem is logged and raised as an alert.
    pub async fn start(&mut self, now: Timestamp) -> EngineRunState {
        if self.connect(now).await.is_ok() {
            let _ = self.load_history(now).await;
        }
        self.run_state
    }

    /// Subscribe to every live path and read their current values.
    ///
    /// Current values are shown and evaluated but not appended to the
    /// series; the snapshot and later notifications fill those.
    pub async fn connect(&mut self, now: Timestamp) -> Result<(), AppError> {
        if !self.store.is_available() {
            self.enter_simulation(now);
            return Err(AppError::RemoteUnavailable);
        }

        self.run_state = EngineRunState::Connecting;
        info!("Connecting to remote store");

        for path in paths::SUBSCRIBED {
            if let Err(e) = self.store.subscribe(path).await {
                return Err(self.connection_failed(path, e, now));
            }
        }

        for path in paths::SUBSCRIBED {
            match self.store.read(path).await {
                Ok(Some(value)) => self.apply_value(path, value, false, now),
                Ok(None) => debug!("Nothing stored at {} yet", path),
                Err(e) => return Err(self.connection_failed(path, e, now)),
            }
        }

        self.run_state = EngineRunState::Live;
        self.retention.arm(now);
        info!("Live: subscribed to {} paths", paths::SUBSCRIBED.len());
        Ok(())
    }

    /// Fetch the persisted history and merge it into the series.
    ///
    /// Returns how many records were inserted.
    pub async fn load_history(&mut self, now: Timestamp) -> Result<usize, AppError> {
        let limit = self.config.snapshot_ceiling as usize;
        let records = match self
            .store
            .range_query(paths::SENSOR_HISTORY, "timestamp", Some(limit))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!("Loading sensor history failed: {}", e);
                let message = format!("loading history failed: {e}");
                self.raise(Severity::Danger, &message, now);
                return Err(e.into());
            }
        };

        let records = decode_snapshot(records);
        let inserted = self
            .reconciler
            .ingest_snapshot(&mut self.state.series, &records);
        info!("Loaded {} history records", inserted);

        // A current value read at connect was already evaluated.
        if inserted > 0 && self.state.current.is_none() {
            let readings = self.state.series.latest_readings();
            self.on_readings(readings, now);
        } else if inserted > 0 {
            self.publish(EngineEvent::SensorsUpdated {
                readings: self.current_readings(),
                at: now,
            });
        }
        Ok(inserted)
    }

    /// Drain every buffered store notification.
    ///
    /// Returns how many notifications were handled.
    pub fn pump(&mut self, now: Timestamp) -> usize {
        let mut handled = 0;
        while let Some(change) = self.store.try_next_change() {
            self.handle_change(change, now);
            handled += 1;
        }
        handled
    }

    pub fn handle_change(&mut self, change: StoreChange, now: Timestamp) {
        if self.source.is_simulated() {
            debug!("Simulated source, ignoring change at {}", change.path);
            return;
        }
        if change.from_history_write() {
            debug!("Ignoring history write at {}", change.origin);
            return;
        }
        if change.value.is_null() {
            debug!("{} was cleared", change.path);
            return;
        }
        self.apply_value(&change.path, change.value, true, now);
    }

    /// Run every timer-driven duty that is due at `now`.
    pub async fn tick(&mut self, now: Timestamp) {
        self.sync_sessions(now);
        self.pump(now);

        if self.source.is_simulated() {
            self.simulate(now);
        } else if self.run_state == EngineRunState::Live && self.retention.is_due(now) {
            self.run_retention(now).await;
        }

        self.expire_commands(now);
        self.alerts.expire(now);
    }

    fn apply_value(&mut self, path: &str, value: Value, live: bool, now: Timestamp) {
        match path {
            paths::SENSORS => {
                if let Some(readings) = decode::<SensorReadings>(path, value) {
                    if live {
                        self.reconciler
                            .ingest_live(&mut self.state.series, &readings, now);
                    }
                    self.on_readings(readings, now);
                }
            }
            paths::ACTUATORS => {
                if let Some(record) = decode::<ActuatorsRecord>(path, value) {
                    self.apply_actuators(&record, now);
                }
            }
            paths::RANGES => {
                if let Some(ranges) = decode::<ControlRanges>(path, value) {
                    self.state.control_ranges = ranges;
                    self.publish(EngineEvent::ConfigUpdated(ConfigKind::Ranges));
                }
            }
            paths::LIGHT_SCHEDULE => {
                if let Some(schedule) = decode::<LightSchedule>(path, value) {
                    self.state.light_schedule = schedule;
                    self.publish(EngineEvent::ConfigUpdated(ConfigKind::LightSchedule));
                }
            }
            other => debug!("No handler for {}", other),
        }
    }

    fn on_readings(&mut self, readings: SensorReadings, now: Timestamp) {
        debug!("Sensors: {}", readings);
        self.state.current = Some(readings);
        self.state.last_update = Some(now);
        self.publish(EngineEvent::SensorsUpdated { readings, at: now });

        let raised = self.alerts.evaluate_readings(&readings, now);
        for alert in raised {
            self.emit(alert);
        }
    }

    fn apply_actuators(&mut self, record: &ActuatorsRecord, now: Timestamp) {
        let remote = record.state();
        let changed = self.state.actuators.confirm_all(&remote);
        let mode_changed = self.state.authority.apply_mode(record.mode());

        for actuator in changed.iter().copied() {
            let alert = self
                .alerts
                .evaluate_actuator(actuator, remote.get(actuator), now);
            self.emit(alert);
        }
        if mode_changed {
            info!("Control mode is now {}", record.mode().label());
            let alert = self.alerts.mode_changed(record.mode(), now);
            self.emit(alert);
        }
        if !changed.is_empty() || mode_changed {
            self.publish_actuators();
        }
    }

    fn connection_failed(&mut self, path: &str, e: StoreError, now: Timestamp) -> AppError {
        error!("Remote store failed on {}: {}", path, e);
        self.enter_simulation(now);
        e.into()
    }

    /// Switch to the local random walk for the rest of the process.
    fn enter_simulation(&mut self, now: Timestamp) {
        if self.source.is_simulated() {
            return;
        }
        warn!("Remote store unavailable, falling back to simulated data");

        let mut walk = RandomWalk::new(self.config.rng_seed);
        self.state.series = SeriesSet::new(self.config.fallback_ceiling as usize);
        let warm_up = walk.warm_up(
            self.config.warm_up_samples as usize,
            self.config.warm_up_interval_ms,
            now,
        );
        for (at, readings) in &warm_up {
            self.reconciler
                .ingest_live(&mut self.state.series, readings, *at);
        }

        self.source = SampleSource::Simulated(walk);
        self.run_state = EngineRunState::Simulated;
        self.last_sim_tick = now;
        self.raise(
            Severity::Warning,
            "remote store unavailable, showing simulated data",
            now,
        );

        let readings = self.state.series.latest_readings();
        self.state.last_update = Some(now);
        self.publish(EngineEvent::SensorsUpdated { readings, at: now });
    }

    fn simulate(&mut self, now: Timestamp) {
        if now.saturating_sub(self.last_sim_tick) < self.config.simulation_tick_ms {
            return;
        }
        let SampleSource::Simulated(walk) = &mut self.source else {
            return;
        };

        let previous = self.state.series.latest_readings();
        let next = walk.step(&previous, &self.state.actuators.state());
        self.last_sim_tick = now;

        self.reconciler
            .ingest_live(&mut self.state.series, &next, now);
        self.on_readings(next, now);
    }

    async fn run_retention(&mut self, now: Timestamp) {
        let report = self.retention.run(&mut self.store, now).await;
        for failure in &report.failures {
            let message = format!("{} failed: {}", failure.step.label(), failure.error);
            self.raise(Severity::Danger, &message, now);
        }
    }

    /// Revert optimistic commands the store never echoed.
    fn expire_commands(&mut self, now: Timestamp) {
        let reverted = self
            .state
            .actuators
            .expire(now, self.config.optimistic_timeout_ms);
        if reverted.is_empty() {
            return;
        }

        for actuator in reverted {
            warn!("{} command not confirmed, reverting", actuator.name());
            let message = format!("{} command not confirmed, reverted", actuator.name());
            self.raise(Severity::Warning, &message, now);
        }
        self.publish_actuators();
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Ignoring malformed value at {}: {}", path, e);
            None
        }
    }
}
