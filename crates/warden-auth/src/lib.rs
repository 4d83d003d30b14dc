//! Warden Authentication Layer
//!
//! Credential lifecycle for a web application's user plugin:
//!
//! - **Bearer tokens**: opaque OAuth2 password-grant access/refresh pairs
//! - **Password reset**: single-use, purpose-tagged tokens bound to a user
//! - **Login throttle**: lockout per (client IP, identifier) after repeated failures
//! - **Sessions**: cookie-backed alternative to bearer tokens
//! - **Password security**: Argon2id hashing
//!
//! # Security Features
//!
//! - Only SHA-256 digests of credentials reach the stores
//! - Refresh and reset tokens are single use
//! - Throttle fails closed when its store is unreachable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Authentication Flow                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request → AuthMiddleware → Handler                          │
//! │                 │                                            │
//! │         ┌───────┴────────┐                                   │
//! │         ▼                ▼                                   │
//! │   Bearer token  ──miss──▶ Session cookie                     │
//! │         │                │                                   │
//! │  BearerTokenManager  SessionAdapter                          │
//! │         └───────┬────────┘                                   │
//! │                 ▼                                            │
//! │         AuthenticatedUser                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Login:  LoginThrottle → PasswordService → issue / establish │
//! │  Reset:  request → resolve → commit (ResetTokenManager)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bearer;
pub mod config;
pub mod error;
pub mod grant;
pub mod middleware;
pub mod notify;
pub mod password;
pub mod reset;
pub mod session;
pub mod throttle;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use bearer::{extract_bearer, BearerTokenManager};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, ErrorResponse};
pub use grant::{GrantResponse, PasswordGrant, SessionLogin};
pub use middleware::{AuthLayer, AuthMiddleware, ClientIp, OptionalUser, RequireAuth};
pub use notify::{LogNotifier, Notification, Notifier, QueueNotifier};
pub use password::PasswordService;
pub use reset::{ResetRequest, ResetTokenManager, ResetUrlBuilder};
pub use session::{EstablishedSession, SessionAdapter, SessionOutcome};
pub use throttle::{extract_client_ip, LoginThrottle};
pub use types::*;

use std::sync::Arc;
use warden_db::{Clock, CredentialStore, Database, ResetTokenRepository, SystemClock, UserRepository};

/// Collaborators the credential managers are built on
#[derive(Clone)]
pub struct AuthBackends {
    pub store: CredentialStore,
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn ResetTokenRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl AuthBackends {
    /// PostgreSQL repositories, the Redis credential store and the wall clock
    pub fn from_database(db: &Database, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store: db.credential_store(),
            users: Arc::new(db.user_repo()),
            tokens: Arc::new(db.reset_token_repo()),
            notifier,
            clock: Arc::new(SystemClock),
        }
    }
}

/// All credential managers wired to the same backends
#[derive(Clone)]
pub struct AuthService {
    pub bearer: Arc<BearerTokenManager>,
    pub reset: Arc<ResetTokenManager>,
    pub throttle: Arc<LoginThrottle>,
    pub session: Arc<SessionAdapter>,
    pub grant: PasswordGrant,
    pub password: PasswordService,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(backends: AuthBackends, config: AuthConfig) -> Self {
        let password = PasswordService::new(config.password.clone());

        let bearer = Arc::new(BearerTokenManager::new(
            backends.store.clone(),
            backends.users.clone(),
            backends.clock.clone(),
            config.bearer.clone(),
        ));
        let session = Arc::new(SessionAdapter::new(
            backends.store.clone(),
            backends.users.clone(),
            backends.clock.clone(),
            config.session.clone(),
        ));
        let throttle = Arc::new(LoginThrottle::new(
            backends.store.clone(),
            backends.clock.clone(),
            config.throttle.clone(),
        ));
        let reset = Arc::new(ResetTokenManager::new(
            backends.users.clone(),
            backends.tokens.clone(),
            backends.notifier.clone(),
            password.clone(),
            config.reset.clone(),
        ));
        let grant = PasswordGrant::new(
            backends.users,
            password.clone(),
            throttle.clone(),
            bearer.clone(),
            session.clone(),
        );

        Self {
            bearer,
            reset,
            throttle,
            session,
            grant,
            password,
            config,
        }
    }

    pub fn from_database(db: &Database, notifier: Arc<dyn Notifier>, config: AuthConfig) -> Self {
        Self::new(AuthBackends::from_database(db, notifier), config)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create an auth layer for Axum router
    pub fn layer(&self) -> AuthLayer {
        AuthLayer::new(self.bearer.clone(), self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{password_config, Fixture};

    #[tokio::test]
    async fn test_managers_share_backends() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;

        let mut config = AuthConfig::default();
        config.password = password_config();
        let auth = AuthService::new(
            AuthBackends {
                store: fx.store.clone(),
                users: Arc::new(fx.directory.clone()),
                tokens: Arc::new(fx.directory.clone()),
                notifier: Arc::new(LogNotifier),
                clock: fx.clock(),
            },
            config,
        );

        let response = auth.grant.authenticate("bob", "hunter2hunter2", "1.2.3.4").await.unwrap();
        let principal = auth.bearer.validate(&response.tokens.access_token).await.unwrap().unwrap();
        assert_eq!(principal.user_id, 1);
        assert_eq!(auth.throttle.status("bob", "1.2.3.4").await.unwrap(), None);
    }
}
