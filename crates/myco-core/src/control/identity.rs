//! Identity provider seam

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, info};
use thiserror_no_std::Error;

/// A verified admin identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub uid: String,
    pub email: String,
}

impl UserRef {
    pub fn new(uid: &str, email: &str) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity provider unavailable")]
    ProviderUnavailable,
}

/// External credential exchange plus its auth-state notifications
pub trait IdentityProvider {
    /// Exchange credentials for a verified identity.
    fn sign_in(
        &mut self,
        credentials: &Credentials<'_>,
    ) -> impl Future<Output = Result<UserRef, AuthError>>;

    /// End the provider-side session.
    fn sign_out(&mut self) -> impl Future<Output = ()>;

    /// Next buffered auth-state change: `Some(None)` means signed out.
    fn try_next_session_change(&mut self) -> Option<Option<UserRef>>;
}

struct Account {
    email: String,
    password: String,
    user: UserRef,
}

/// Identity provider backed by accounts registered at runtime
///
/// Stands in for the hosted provider in tests and in the simulator. It holds
/// no built-in accounts.
pub struct MemoryIdentityProvider {
    accounts: Vec<Account>,
    changes: VecDeque<Option<UserRef>>,
    available: bool,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: Vec::new(),
            changes: VecDeque::new(),
            available: true,
        }
    }

    /// Provider that rejects every exchange as unreachable
    pub fn unreachable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn register(&mut self, email: &str, password: &str) -> UserRef {
        let user = UserRef::new(&format!("uid-{}", self.accounts.len() + 1), email);
        self.accounts.push(Account {
            email: email.to_string(),
            password: password.to_string(),
            user: user.clone(),
        });
        user
    }

    /// Simulate the provider ending the session on its own (token revoked,
    /// expired, signed out elsewhere).
    pub fn revoke_session(&mut self) {
        info!("identity provider revoked the session");
        self.changes.push_back(None);
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&mut self, credentials: &Credentials<'_>) -> Result<UserRef, AuthError> {
        if credentials.email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !self.available {
            return Err(AuthError::ProviderUnavailable);
        }

        let user = self
            .accounts
            .iter()
            .find(|a| a.email == credentials.email && a.password == credentials.password)
            .map(|a| a.user.clone())
            .ok_or(AuthError::InvalidCredentials)?;

        debug!("signed in {}", user.email);
        self.changes.push_back(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&mut self) {
        self.changes.push_back(None);
    }

    fn try_next_session_change(&mut self) -> Option<Option<UserRef>> {
        self.changes.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_sign_in_checks_registered_accounts() {
        let mut provider = MemoryIdentityProvider::new();
        let admin = provider.register("admin@example.com", "s3cret-pass");

        let ok = block_on(provider.sign_in(&Credentials {
            email: "admin@example.com",
            password: "s3cret-pass",
        }));
        assert_eq!(ok, Ok(admin.clone()));
        assert_eq!(provider.try_next_session_change(), Some(Some(admin)));

        let bad = block_on(provider.sign_in(&Credentials {
            email: "admin@example.com",
            password: "wrong",
        }));
        assert_eq!(bad, Err(AuthError::InvalidCredentials));
        assert_eq!(provider.try_next_session_change(), None);
    }

    #[test]
    fn test_empty_credentials_are_rejected_up_front() {
        let mut provider = MemoryIdentityProvider::unreachable();
        let result = block_on(provider.sign_in(&Credentials {
            email: "",
            password: "x",
        }));
        assert_eq!(result, Err(AuthError::MissingCredentials));
    }
}
