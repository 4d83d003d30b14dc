//! Password grant
//!
//! Login flow shared by the OAuth2 password grant and the session login:
//!
//! ```text
//! throttle.check -> lookup user -> verify hash --fail--> throttle.on_failure -> 401
//!                                              \--ok---> throttle.on_success -> blocked? -> issue
//! ```

use std::sync::Arc;
use tracing::{error, info, warn};
use warden_db::{UserRecord, UserRepository};

use crate::bearer::BearerTokenManager;
use crate::error::{AuthError, AuthResult};
use crate::password::PasswordService;
use crate::session::{EstablishedSession, SessionAdapter};
use crate::throttle::LoginThrottle;
use crate::types::{AuthMethod, AuthenticatedUser, IssuedTokens};

/// Successful grant
#[derive(Debug, Clone)]
pub struct GrantResponse {
    pub tokens: IssuedTokens,
    pub user: AuthenticatedUser,
}

/// Successful session login
#[derive(Debug)]
pub struct SessionLogin {
    pub session: EstablishedSession,
    pub user: AuthenticatedUser,
}

#[derive(Clone)]
pub struct PasswordGrant {
    users: Arc<dyn UserRepository>,
    passwords: PasswordService,
    throttle: Arc<LoginThrottle>,
    bearer: Arc<BearerTokenManager>,
    sessions: Arc<SessionAdapter>,
}

impl PasswordGrant {
    pub fn new(
        users: Arc<dyn UserRepository>,
        passwords: PasswordService,
        throttle: Arc<LoginThrottle>,
        bearer: Arc<BearerTokenManager>,
        sessions: Arc<SessionAdapter>,
    ) -> Self {
        Self {
            users,
            passwords,
            throttle,
            bearer,
            sessions,
        }
    }

    /// Check credentials behind the throttle and do the failure/success bookkeeping.
    ///
    /// Failures count against both the presented identifier and, when it
    /// resolves, the account, so spelling the identifier differently does not
    /// buy extra guesses.
    pub async fn verify_credentials(&self, identifier: &str, password: &str, ip: &str) -> AuthResult<UserRecord> {
        self.throttle.check(identifier, ip).await?;

        let user = self.users.find_by_identifier(identifier).await?;
        let account = user.as_ref().map(|u| LoginThrottle::account_identity(u.id));
        if let Some(account) = &account {
            self.throttle.check(account, ip).await?;
        }

        let stored_hash = match &user {
            Some(user) => self.users.find_password_hash(user.id).await?,
            None => None,
        };
        let verified = match (&user, stored_hash) {
            (Some(user), Some(hash)) => self.passwords.verify_password(password, &hash).unwrap_or_else(|e| {
                error!(user_id = user.id, error = %e, "Stored password hash is unusable");
                false
            }),
            _ => {
                self.passwords.verify_dummy(password);
                false
            }
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                let mut locked = self.throttle.on_failure(identifier, ip).await?;
                if let Some(account) = &account {
                    locked |= self.throttle.on_failure(account, ip).await?;
                }
                if locked {
                    warn!(client_ip = %ip, "Login locked for identifier");
                }
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.throttle.on_success(identifier, ip).await?;
        if let Some(account) = &account {
            self.throttle.on_success(account, ip).await?;
        }

        if !user.can_sign_in() {
            return Err(AuthError::AccountBlocked);
        }

        Ok(user)
    }

    /// OAuth2 password grant: credentials in, bearer pair out
    pub async fn authenticate(&self, identifier: &str, password: &str, ip: &str) -> AuthResult<GrantResponse> {
        let user = self.verify_credentials(identifier, password, ip).await?;
        let tokens = self.bearer.issue(&user).await?;

        info!(user_id = user.id, client_ip = %ip, "Password grant succeeded");

        Ok(GrantResponse {
            tokens,
            user: AuthenticatedUser::from_record(&user, AuthMethod::Bearer),
        })
    }

    /// Refresh grant
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<GrantResponse> {
        let (tokens, user) = self.bearer.refresh(refresh_token).await?;
        Ok(GrantResponse {
            tokens,
            user: AuthenticatedUser::from_record(&user, AuthMethod::Bearer),
        })
    }

    /// Session login, rotating away from `previous_session` if present
    pub async fn login_session(
        &self,
        identifier: &str,
        password: &str,
        ip: &str,
        previous_session: Option<&str>,
    ) -> AuthResult<SessionLogin> {
        let user = self.verify_credentials(identifier, password, ip).await?;
        let session = self.sessions.establish(&user, previous_session).await?;

        info!(user_id = user.id, client_ip = %ip, "Session login succeeded");

        Ok(SessionLogin {
            session,
            user: AuthenticatedUser::from_record(&user, AuthMethod::Session),
        })
    }

    /// Revoke whichever credentials were presented. Failures are logged only.
    ///
    /// Returns the removal cookie when a session was presented.
    pub async fn logout(&self, access_token: Option<&str>, session_id: Option<&str>) -> Option<String> {
        if let Some(token) = access_token {
            if let Err(e) = self.bearer.revoke(token).await {
                error!(error = %e, "Failed to revoke bearer token on logout");
            }
        }

        let session_id = session_id?;
        match self.sessions.destroy(session_id).await {
            Ok(cookie) => Some(cookie),
            Err(e) => {
                error!(error = %e, "Failed to destroy session on logout");
                Some(self.sessions.removal_cookie())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BearerConfig, SessionConfig, ThrottleConfig};
    use crate::testing::{passwords, Fixture};
    use std::time::Duration;

    const IP: &str = "1.2.3.4";

    fn grant(fx: &Fixture) -> PasswordGrant {
        let users: Arc<dyn UserRepository> = Arc::new(fx.directory.clone());
        PasswordGrant::new(
            users.clone(),
            passwords(),
            Arc::new(LoginThrottle::new(fx.store.clone(), fx.clock(), ThrottleConfig::default())),
            Arc::new(BearerTokenManager::new(
                fx.store.clone(),
                users.clone(),
                fx.clock(),
                BearerConfig::default(),
            )),
            Arc::new(SessionAdapter::new(fx.store.clone(), users, fx.clock(), SessionConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_grant_issues_tokens() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        let response = grant.authenticate("bob", "hunter2hunter2", IP).await.unwrap();
        assert_eq!(response.user.user_id, 1);
        assert_eq!(response.tokens.token_type, "Bearer");
        assert!(grant.bearer.validate(&response.tokens.access_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        assert!(matches!(
            grant.authenticate("bob", "wrong", IP).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            grant.authenticate("nobody", "wrong", IP).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_lockout_blocks_correct_password() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        for _ in 0..3 {
            let _ = grant.authenticate("bob", "wrong", IP).await;
        }

        assert!(matches!(
            grant.authenticate("bob", "hunter2hunter2", IP).await,
            Err(AuthError::AccountLocked { .. })
        ));

        fx.clock.advance(Duration::from_secs(10 * 60 + 1));
        assert!(grant.authenticate("bob", "hunter2hunter2", IP).await.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_covers_every_spelling_of_the_account() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        for _ in 0..3 {
            let _ = grant.authenticate("bob@example.com", "wrong", IP).await;
        }

        for identifier in ["BOB@EXAMPLE.COM", "Bob@example.com", "bob"] {
            assert!(matches!(
                grant.authenticate(identifier, "hunter2hunter2", IP).await,
                Err(AuthError::AccountLocked { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_mixed_spellings_share_one_failure_budget() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        let _ = grant.authenticate("bob", "wrong", IP).await;
        let _ = grant.authenticate("bob@example.com", "wrong", IP).await;
        let _ = grant.authenticate("BOB@example.com", "wrong", IP).await;

        assert!(matches!(
            grant.authenticate("bob", "hunter2hunter2", IP).await,
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in() {
        let fx = Fixture::new();
        let user = fx.user(1, "bob", Some("hunter2hunter2")).await;
        fx.directory.insert_user(UserRecord { active: false, ..user }, None).await;
        let grant = grant(&fx);

        assert!(matches!(
            grant.authenticate("bob", "hunter2hunter2", IP).await,
            Err(AuthError::AccountBlocked)
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        let _ = grant.authenticate("bob", "wrong", IP).await;
        let _ = grant.authenticate("bob", "wrong", IP).await;
        grant.authenticate("bob", "hunter2hunter2", IP).await.unwrap();
        let _ = grant.authenticate("bob", "wrong", IP).await;
        let _ = grant.authenticate("bob", "wrong", IP).await;

        assert!(grant.authenticate("bob", "hunter2hunter2", IP).await.is_ok());
    }

    #[tokio::test]
    async fn test_blocked_user_cannot_log_in() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        fx.directory.set_blocked(1, true).await.unwrap();
        let grant = grant(&fx);

        assert!(matches!(
            grant.authenticate("bob", "hunter2hunter2", IP).await,
            Err(AuthError::AccountBlocked)
        ));
    }

    #[tokio::test]
    async fn test_session_login_and_logout() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);

        let login = grant
            .login_session("bob@example.com", "hunter2hunter2", IP, None)
            .await
            .unwrap();
        assert_eq!(login.user.auth_method, AuthMethod::Session);

        let cookie = grant.logout(None, Some(&login.session.id)).await.unwrap();
        assert!(cookie.contains("Max-Age=0"));
        assert!(fx.kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_logout_revokes_bearer_pair() {
        let fx = Fixture::new();
        fx.user(1, "bob", Some("hunter2hunter2")).await;
        let grant = grant(&fx);
        let response = grant.authenticate("bob", "hunter2hunter2", IP).await.unwrap();

        assert_eq!(grant.logout(Some(&response.tokens.access_token), None).await, None);
        assert!(matches!(
            grant.refresh(&response.tokens.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }
}
