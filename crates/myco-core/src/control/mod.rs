//! Control authority: who may command actuators and when
//!
//! The authority is the product of two independent pieces of state:
//!
//! | Session           | Mode   | Actuator command | Mode change | Config write |
//! |-------------------|--------|------------------|-------------|--------------|
//! | Unauthenticated   | any    | denied           | denied      | denied       |
//! | Authenticated     | Auto   | denied           | allowed     | allowed      |
//! | Authenticated     | Manual | allowed          | allowed     | allowed      |
//!
//! Every denial carries a [`DenyReason`] so callers can tell a missing login
//! apart from a wrong mode.

mod actuators;
mod identity;

pub use actuators::{Actuator, ActuatorLedger, ActuatorState, ActuatorValue};
pub use identity::{AuthError, Credentials, IdentityProvider, MemoryIdentityProvider, UserRef};

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Who decides actuator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// The external automatic controller owns actuator decisions
    #[default]
    Auto,
    /// An authenticated admin commands actuators by hand
    Manual,
}

impl ControlMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Auto => "automatic",
            Self::Manual => "manual",
        }
    }

    /// Value of the `auto` flag stored under `Actuators`
    pub const fn auto_flag(self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Why the authority refused a request
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    #[error("admin login required")]
    NotAuthenticated,
    #[error("actuators can only be commanded in manual mode (current mode: {})", .mode.label())]
    WrongMode { mode: ControlMode },
}

/// Authentication state of the local admin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSession {
    identity: Option<UserRef>,
}

impl AdminSession {
    pub const fn authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub const fn identity(&self) -> Option<&UserRef> {
        self.identity.as_ref()
    }
}

/// Session × mode state machine gating every side-effecting request
#[derive(Debug, Clone, Default)]
pub struct ControlAuthority {
    session: AdminSession,
    mode: ControlMode,
}

impl ControlAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn session(&self) -> &AdminSession {
        &self.session
    }

    pub const fn is_authenticated(&self) -> bool {
        self.session.authenticated()
    }

    pub const fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Record a verified identity. Only called after the identity provider
    /// accepted the credentials.
    pub fn sign_in(&mut self, identity: UserRef) {
        self.session.identity = Some(identity);
    }

    /// Drop the session. Returns whether anything changed.
    pub fn sign_out(&mut self) -> bool {
        self.session.identity.take().is_some()
    }

    /// Re-synchronize with whatever the session provider reports.
    ///
    /// Returns whether the authenticated flag flipped.
    pub fn sync_session(&mut self, identity: Option<UserRef>) -> bool {
        let was = self.session.authenticated();
        self.session.identity = identity;
        was != self.session.authenticated()
    }

    /// Adopt the mode reported by the remote store.
    pub fn apply_mode(&mut self, mode: ControlMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    pub fn authorize_mode_change(&self) -> Result<(), DenyReason> {
        self.require_session()
    }

    pub fn authorize_config_write(&self) -> Result<(), DenyReason> {
        self.require_session()
    }

    pub fn authorize_actuator(&self) -> Result<(), DenyReason> {
        self.require_session()?;
        match self.mode {
            ControlMode::Manual => Ok(()),
            mode => Err(DenyReason::WrongMode { mode }),
        }
    }

    fn require_session(&self) -> Result<(), DenyReason> {
        if self.session.authenticated() {
            Ok(())
        } else {
            Err(DenyReason::NotAuthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> UserRef {
        UserRef::new("uid-1", "admin@example.com")
    }

    #[test]
    fn test_unauthenticated_is_denied_everything() {
        let authority = ControlAuthority::new();
        assert_eq!(authority.authorize_actuator(), Err(DenyReason::NotAuthenticated));
        assert_eq!(authority.authorize_mode_change(), Err(DenyReason::NotAuthenticated));
        assert_eq!(authority.authorize_config_write(), Err(DenyReason::NotAuthenticated));
    }

    #[test]
    fn test_auto_mode_denies_actuators_even_when_authenticated() {
        let mut authority = ControlAuthority::new();
        authority.sign_in(admin());

        assert_eq!(
            authority.authorize_actuator(),
            Err(DenyReason::WrongMode {
                mode: ControlMode::Auto
            })
        );
        assert_eq!(authority.authorize_mode_change(), Ok(()));

        authority.apply_mode(ControlMode::Manual);
        assert_eq!(authority.authorize_actuator(), Ok(()));
    }

    #[test]
    fn test_sign_out_is_idempotent() {
        let mut authority = ControlAuthority::new();
        authority.sign_in(admin());

        assert!(authority.sign_out());
        assert!(!authority.sign_out());
        assert!(!authority.is_authenticated());
    }

    #[test]
    fn test_session_follows_provider() {
        let mut authority = ControlAuthority::new();
        assert!(authority.sync_session(Some(admin())));
        assert!(!authority.sync_session(Some(admin())));
        assert!(authority.sync_session(None));
        assert_eq!(authority.session().identity(), None);
    }
}
