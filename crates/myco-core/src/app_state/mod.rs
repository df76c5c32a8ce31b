//! Engine state, events and the top-level error type

mod commands;
mod lifecycle;

use alloc::string::String;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};
use log::warn;
use thiserror_no_std::Error;

use crate::Timestamp;
use crate::alerts::{Alert, AlertEngine, Severity};
use crate::config::Config;
use crate::control::{
    ActuatorLedger, ActuatorState, AuthError, ControlAuthority, ControlMode, DenyReason,
    IdentityProvider,
};
use crate::sensors::{SampleSource, SensorReadings, SensorStatus, SensorType};
use crate::storage::{HistoryRetentionJob, Sample, SeriesSet, SeriesStats};
use crate::store::{RemoteStore, StoreError};
use crate::sync::SyncReconciler;
use crate::validation::{ControlRanges, LightSchedule, ValidationError};

/// Queue depth of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Subscribers that can listen to engine events
/// - Subscriber 0: presentation layer
/// - Subscriber 1: logging / tests
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Only the engine publishes
pub const EVENT_PUBLISHERS: usize = 1;

/// Channel the engine publishes on. Single-threaded, so no locking.
pub type EventChannel = PubSubChannel<
    NoopRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventPublisher<'a> = Publisher<
    'a,
    NoopRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventSubscriber<'a> = Subscriber<
    'a,
    NoopRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRunState {
    Idle,
    Connecting,
    /// Fed by remote store notifications
    Live,
    /// Fed by the local random walk
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Ranges,
    LightSchedule,
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SensorsUpdated {
        readings: SensorReadings,
        at: Timestamp,
    },
    ActuatorsUpdated {
        state: ActuatorState,
        mode: ControlMode,
    },
    ConfigUpdated(ConfigKind),
    SessionChanged {
        authenticated: bool,
    },
    AlertRaised(Alert),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("remote store unavailable")]
    RemoteUnavailable,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(AuthError),
    #[error("{0}")]
    ValidationFailed(ValidationError),
    #[error("request denied: {0}")]
    AuthorizationDenied(DenyReason),
    #[error("persistence failed: {0}")]
    PersistenceFailed(StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable => Self::RemoteUnavailable,
            other => Self::PersistenceFailed(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        Self::AuthenticationFailed(e)
    }
}

impl From<DenyReason> for AppError {
    fn from(e: DenyReason) -> Self {
        Self::AuthorizationDenied(e)
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::ValidationFailed(e)
    }
}

/// Everything the engine mirrors from the remote store
#[derive(Debug, Clone)]
struct EngineState {
    series: SeriesSet,
    /// Last value pushed to `Sensors`, which may be newer than any buffered sample
    current: Option<SensorReadings>,
    actuators: ActuatorLedger,
    authority: ControlAuthority,
    control_ranges: ControlRanges,
    light_schedule: LightSchedule,
    last_update: Option<Timestamp>,
}

impl EngineState {
    fn new(live_ceiling: usize) -> Self {
        Self {
            series: SeriesSet::new(live_ceiling),
            current: None,
            actuators: ActuatorLedger::new(),
            authority: ControlAuthority::new(),
            control_ranges: ControlRanges::default(),
            light_schedule: LightSchedule::default(),
            last_update: None,
        }
    }
}

/// The telemetry synchronization and control-state engine
///
/// Owns all mirrored state and drives every component from discrete calls:
/// [`Engine::start`] once, then [`Engine::tick`] from the event loop, plus
/// user-initiated commands in between. Nothing here reads a clock; every
/// call takes the current time.
pub struct Engine<'a, S: RemoteStore, I: IdentityProvider> {
    store: S,
    identity: I,
    config: Config,
    state: EngineState,
    source: SampleSource,
    reconciler: SyncReconciler,
    retention: HistoryRetentionJob,
    alerts: AlertEngine,
    publisher: Option<EventPublisher<'a>>,
    run_state: EngineRunState,
    last_sim_tick: Timestamp,
}

impl<'a, S: RemoteStore, I: IdentityProvider> Engine<'a, S, I> {
    pub fn new(store: S, identity: I, config: Config) -> Self {
        Self {
            state: EngineState::new(config.live_ceiling as usize),
            source: SampleSource::Live,
            reconciler: SyncReconciler::new(),
            retention: HistoryRetentionJob::new(
                config.persisted_ceiling as usize,
                config.retention_interval(),
            ),
            alerts: AlertEngine::new(config.sensor_ranges, config.alert_ttl().as_millis()),
            publisher: None,
            run_state: EngineRunState::Idle,
            last_sim_tick: 0,
            store,
            identity,
            config,
        }
    }

    /// Publish engine events on `publisher`.
    pub fn with_publisher(mut self, publisher: EventPublisher<'a>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub const fn run_state(&self) -> EngineRunState {
        self.run_state
    }

    pub const fn is_simulated(&self) -> bool {
        self.source.is_simulated()
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn series(&self) -> &SeriesSet {
        &self.state.series
    }

    /// Most recent readings, falling back to the channel defaults.
    pub fn current_readings(&self) -> SensorReadings {
        self.state
            .current
            .unwrap_or_else(|| self.state.series.latest_readings())
    }

    pub fn sensor_status(&self, sensor: SensorType) -> SensorStatus {
        self.alerts
            .ranges()
            .get(sensor)
            .classify(self.current_readings().get(sensor))
    }

    /// Last `n` samples of one channel for sparklines.
    pub fn window(&self, sensor: SensorType, n: usize) -> impl Iterator<Item = Sample> + '_ {
        self.state.series.get(sensor).window(n)
    }

    pub fn stats(&self, sensor: SensorType) -> Option<SeriesStats> {
        self.state.series.get(sensor).stats()
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.state.actuators.state()
    }

    pub const fn actuators(&self) -> &ActuatorLedger {
        &self.state.actuators
    }

    pub const fn mode(&self) -> ControlMode {
        self.state.authority.mode()
    }

    pub const fn is_authenticated(&self) -> bool {
        self.state.authority.is_authenticated()
    }

    pub const fn control_ranges(&self) -> &ControlRanges {
        &self.state.control_ranges
    }

    pub const fn light_schedule(&self) -> &LightSchedule {
        &self.state.light_schedule
    }

    pub const fn last_update(&self) -> Option<Timestamp> {
        self.state.last_update
    }

    /// Alert backlog, newest first
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.alerts.backlog()
    }

    /// Full in-memory history as
    /// `{"temperature":[{"time":..,"value":..}],"humidity":[..],"co2":[..]}`.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.state.series)
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Direct access to the store, for device emulation and tests.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub const fn identity_mut(&mut self) -> &mut I {
        &mut self.identity
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(publisher) = &self.publisher {
            publisher.publish_immediate(event);
        }
    }

    fn publish_actuators(&self) {
        self.publish(EngineEvent::ActuatorsUpdated {
            state: self.state.actuators.state(),
            mode: self.state.authority.mode(),
        });
    }

    fn raise(&mut self, severity: Severity, message: &str, now: Timestamp) {
        let alert = self.alerts.raise(severity, message, now);
        self.publish(EngineEvent::AlertRaised(alert));
    }

    fn emit(&mut self, alert: Alert) {
        self.publish(EngineEvent::AlertRaised(alert));
    }

    /// Log and surface a denied request, then hand back the error.
    fn deny(&mut self, reason: DenyReason, what: &str, now: Timestamp) -> AppError {
        warn!("Denied {}: {}", what, reason);
        let message = alloc::format!("{what} denied: {reason}");
        self.raise(Severity::Warning, &message, now);
        AppError::AuthorizationDenied(reason)
    }
}
