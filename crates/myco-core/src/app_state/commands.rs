//! User-initiated requests gated by the control authority

use alloc::format;

use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;

use super::{AppError, ConfigKind, Engine, EngineEvent};
use crate::Timestamp;
use crate::alerts::Severity;
use crate::control::{Actuator, ControlMode, Credentials, IdentityProvider};
use crate::storage::ActuatorHistoryRecord;
use crate::storage::retention::append_record;
use crate::store::{RemoteStore, StoreError, child_path, paths};
use crate::validation::{
    ControlRanges, LightSchedule, ValidationError, validate_light_schedule, validate_ranges,
};

impl<S: RemoteStore, I: IdentityProvider> Engine<'_, S, I> {
    /// Exchange credentials with the identity provider.
    ///
    /// A rejected exchange changes nothing.
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        now: Timestamp,
    ) -> Result<(), AppError> {
        self.sync_sessions(now);

        let user = match self.identity.sign_in(credentials).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Sign-in rejected: {}", e);
                return Err(e.into());
            }
        };

        info!("Admin {} signed in", user.email);
        let message = format!("signed in as {}", user.email);
        self.state.authority.sign_in(user);
        self.publish(EngineEvent::SessionChanged {
            authenticated: true,
        });
        self.raise(Severity::Success, &message, now);

        // Drain the provider's echo of this sign-in.
        self.sync_sessions(now);
        Ok(())
    }

    /// End the admin session. Calling it while signed out does nothing.
    pub async fn logout(&mut self, now: Timestamp) {
        self.sync_sessions(now);
        self.identity.sign_out().await;

        if self.state.authority.sign_out() {
            info!("Admin signed out");
            self.publish(EngineEvent::SessionChanged {
                authenticated: false,
            });
            self.raise(Severity::Info, "signed out", now);
        }
        self.sync_sessions(now);
    }

    /// Follow whatever the session provider reports.
    pub fn sync_sessions(&mut self, now: Timestamp) {
        while let Some(identity) = self.identity.try_next_session_change() {
            if !self.state.authority.sync_session(identity) {
                continue;
            }

            let authenticated = self.state.authority.is_authenticated();
            info!("Session provider reports authenticated = {}", authenticated);
            self.publish(EngineEvent::SessionChanged { authenticated });
            let message = if authenticated {
                "admin session restored"
            } else {
                "admin session ended"
            };
            self.raise(Severity::Info, message, now);
        }
    }

    pub async fn set_mode(&mut self, mode: ControlMode, now: Timestamp) -> Result<(), AppError> {
        self.refresh(now);
        if let Err(reason) = self.state.authority.authorize_mode_change() {
            return Err(self.deny(reason, "mode change", now));
        }

        if self.is_simulated() {
            self.offline_write("mode change", now);
        } else {
            let path = child_path(paths::ACTUATORS, paths::AUTO_FIELD);
            self.write_remote(&path, Value::Bool(mode.auto_flag()), now)
                .await?;
        }

        if self.state.authority.apply_mode(mode) {
            info!("Control mode set to {}", mode.label());
            let alert = self.alerts.mode_changed(mode, now);
            self.emit(alert);
            self.publish_actuators();
        }
        Ok(())
    }

    /// Switch one actuator by hand.
    ///
    /// Requires an admin session and manual mode. The value is applied
    /// optimistically, written through to the store and followed by an
    /// immediate history record once the write has completed.
    pub async fn command_actuator(
        &mut self,
        actuator: Actuator,
        on: bool,
        now: Timestamp,
    ) -> Result<(), AppError> {
        self.refresh(now);
        if let Err(reason) = self.state.authority.authorize_actuator() {
            return Err(self.deny(reason, "actuator command", now));
        }

        if self.is_simulated() {
            self.state.actuators.confirm(actuator, on);
            self.offline_write("actuator command", now);
            self.finish_command(actuator, on, now);
            return Ok(());
        }

        self.state.actuators.apply_optimistic(actuator, on, now);
        self.publish_actuators();

        let path = child_path(paths::ACTUATORS, actuator.name());
        if let Err(e) = self.write_remote(&path, Value::Bool(on), now).await {
            self.state.actuators.revert(actuator);
            self.publish_actuators();
            return Err(e);
        }

        // Session and mode may have moved while the write was in flight.
        self.refresh(now);
        if let Err(reason) = self.state.authority.authorize_actuator() {
            return Err(self.deny(reason, "actuator history record", now));
        }

        let record = ActuatorHistoryRecord::new(&self.state.actuators.state(), now);
        if let Err(e) = append_record(&mut self.store, paths::ACTUATOR_HISTORY, &record).await {
            error!("Saving actuator history failed: {}", e);
            let message = format!("saving actuator history failed: {e}");
            self.raise(Severity::Danger, &message, now);
        }

        self.finish_command(actuator, on, now);
        Ok(())
    }

    /// Validate and persist new control ranges.
    pub async fn save_ranges(
        &mut self,
        ranges: ControlRanges,
        now: Timestamp,
    ) -> Result<(), AppError> {
        self.refresh(now);
        if let Err(reason) = self.state.authority.authorize_config_write() {
            return Err(self.deny(reason, "saving ranges", now));
        }

        let validated = match validate_ranges(ranges) {
            Ok(validated) => validated,
            Err(e) => return Err(self.reject(e, now)),
        };
        self.persist_config(paths::RANGES, &*validated, "ranges", now)
            .await?;

        self.state.control_ranges = validated.into_inner();
        self.publish(EngineEvent::ConfigUpdated(ConfigKind::Ranges));
        self.raise(Severity::Success, "control ranges saved", now);
        Ok(())
    }

    /// Validate and persist a new lighting schedule.
    pub async fn save_light_schedule(
        &mut self,
        schedule: LightSchedule,
        now: Timestamp,
    ) -> Result<(), AppError> {
        self.refresh(now);
        if let Err(reason) = self.state.authority.authorize_config_write() {
            return Err(self.deny(reason, "saving light schedule", now));
        }

        let validated = match validate_light_schedule(schedule) {
            Ok(validated) => validated,
            Err(e) => return Err(self.reject(e, now)),
        };
        self.persist_config(paths::LIGHT_SCHEDULE, &*validated, "light schedule", now)
            .await?;

        self.state.light_schedule = validated.into_inner();
        self.publish(EngineEvent::ConfigUpdated(ConfigKind::LightSchedule));
        self.raise(Severity::Success, "light schedule saved", now);
        Ok(())
    }

    /// Catch up on buffered session and store notifications.
    fn refresh(&mut self, now: Timestamp) {
        self.sync_sessions(now);
        self.pump(now);
    }

    fn finish_command(&mut self, actuator: Actuator, on: bool, now: Timestamp) {
        info!("{} switched {}", actuator.name(), if on { "on" } else { "off" });
        self.publish_actuators();
        let alert = self.alerts.evaluate_actuator(actuator, on, now);
        self.emit(alert);
    }

    fn reject(&mut self, e: ValidationError, now: Timestamp) -> AppError {
        warn!("Rejected configuration: {}", e);
        let message = format!("{e}");
        self.raise(Severity::Warning, &message, now);
        AppError::ValidationFailed(e)
    }

    async fn persist_config<T: Serialize>(
        &mut self,
        path: &str,
        value: &T,
        what: &str,
        now: Timestamp,
    ) -> Result<(), AppError> {
        if self.is_simulated() {
            self.offline_write(what, now);
            return Ok(());
        }
        let value = serde_json::to_value(value)
            .map_err(|_| AppError::PersistenceFailed(StoreError::Malformed { path: path.into() }))?;
        self.write_remote(path, value, now).await
    }

    async fn write_remote(&mut self, path: &str, value: Value, now: Timestamp) -> Result<(), AppError> {
        if let Err(e) = self.store.write(path, value).await {
            error!("Write to {} failed: {}", path, e);
            let message = format!("saving {path} failed: {e}");
            self.raise(Severity::Danger, &message, now);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remote writes are skipped while running on simulated data.
    fn offline_write(&mut self, what: &str, now: Timestamp) {
        warn!("Offline: {} kept locally", what);
        let message = format!("offline: {what} not saved to the remote store");
        self.raise(Severity::Info, &message, now);
    }
}
