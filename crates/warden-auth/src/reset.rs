//! Reset Token Manager
//!
//! Three-step forgot-password protocol:
//!
//! 1. [`ResetTokenManager::request`] issues a single-use token (older tokens of
//!    the same type are invalidated in the same transaction) and sends the link.
//! 2. [`ResetTokenManager::resolve`] checks a link without touching it.
//! 3. [`ResetTokenManager::commit`] consumes the token and writes the new
//!    password hash in one transaction.
//!
//! Only the digest of the token is stored.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use warden_db::{NewResetToken, ResetToken, ResetTokenRepository, UserRecord, UserRepository};

use crate::config::ResetConfig;
use crate::error::{AuthError, AuthResult};
use crate::notify::{dispatch, Notification, Notifier};
use crate::password::PasswordService;
use crate::token::{digest, generate_hex_token, short_id};

/// Default link template
pub const DEFAULT_RESET_TEMPLATE: &str = "{origin}/auth/{userId}/forgot-password/reset?t={token}";

/// Renders reset links from the base origin and the named prefixes
#[derive(Debug, Clone)]
pub struct ResetUrlBuilder {
    origin: String,
    prefixes: BTreeMap<String, String>,
}

impl ResetUrlBuilder {
    pub fn new(origin: impl Into<String>, prefixes: BTreeMap<String, String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            prefixes,
        }
    }

    /// Fails with [`AuthError::InvalidResetPrefix`] for an unconfigured name
    pub fn build(&self, prefix: Option<&str>, user_id: i64, token: &str) -> AuthResult<String> {
        let template = match prefix {
            None => DEFAULT_RESET_TEMPLATE,
            Some(name) => self
                .prefixes
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| AuthError::InvalidResetPrefix(name.to_string()))?,
        };

        Ok(template
            .replace("{origin}", &self.origin)
            .replace("{userId}", &user_id.to_string())
            .replace("{token}", token))
    }

    pub fn has_prefix(&self, name: &str) -> bool {
        self.prefixes.contains_key(name)
    }
}

/// Outcome of step 1. Holds the raw token, so it is never logged.
pub struct ResetRequest {
    pub user_id: i64,
    pub token: String,
    pub reset_url: String,
}

impl std::fmt::Debug for ResetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetRequest")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Issues, checks and consumes password reset tokens
#[derive(Clone)]
pub struct ResetTokenManager {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn ResetTokenRepository>,
    notifier: Arc<dyn Notifier>,
    passwords: PasswordService,
    urls: ResetUrlBuilder,
    config: ResetConfig,
}

impl ResetTokenManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn ResetTokenRepository>,
        notifier: Arc<dyn Notifier>,
        passwords: PasswordService,
        config: ResetConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            passwords,
            urls: ResetUrlBuilder::new(config.base_origin.clone(), config.prefixes.clone()),
            config,
        }
    }

    /// Step 1: issue a token for the user matching `identifier` (username or email)
    /// and notify them with the link.
    ///
    /// Unknown and blocked users both yield [`AuthError::UserNotFound`].
    pub async fn request(&self, identifier: &str, prefix: Option<&str>) -> AuthResult<ResetRequest> {
        // Reject a bad prefix before anything is written
        if let Some(name) = prefix {
            if !self.urls.has_prefix(name) {
                return Err(AuthError::InvalidResetPrefix(name.to_string()));
            }
        }

        let user = match self.users.find_by_identifier(identifier).await? {
            Some(user) if !user.blocked => user,
            _ => return Err(AuthError::UserNotFound),
        };

        let token = generate_hex_token(self.config.token_length);
        let stored = self
            .tokens
            .issue(NewResetToken::new(user.id, &self.config.token_type, digest(&token)))
            .await?;
        let reset_url = self.urls.build(prefix, user.id, &token)?;

        info!(
            user_id = user.id,
            token_id = %short_id(&stored.token),
            "Password reset requested"
        );

        dispatch(
            &self.notifier,
            Notification::ResetRequested {
                user_id: user.id,
                email: user.email.clone(),
                display_name: user.display_name().to_string(),
                reset_url: reset_url.clone(),
            },
        );

        Ok(ResetRequest {
            user_id: user.id,
            token,
            reset_url,
        })
    }

    /// Step 2: check a link without side effects
    pub async fn resolve(&self, user_id: i64, token: &str) -> AuthResult<ResetToken> {
        self.resolve_with_user(user_id, token).await.map(|(stored, _)| stored)
    }

    async fn resolve_with_user(&self, user_id: i64, token: &str) -> AuthResult<(ResetToken, UserRecord)> {
        let user = match self.users.find_by_id(user_id).await? {
            Some(user) if !user.blocked => user,
            _ => return Err(AuthError::ResetTokenInvalid),
        };

        let stored = self
            .tokens
            .find(user_id, &self.config.token_type, &digest(token))
            .await?
            .filter(|t| t.is_valid)
            .ok_or(AuthError::ResetTokenInvalid)?;

        Ok((stored, user))
    }

    /// Step 3: consume the token and set the new password
    pub async fn commit(&self, user_id: i64, token: &str, password: &str, confirmation: &str) -> AuthResult<()> {
        if password != confirmation {
            return Err(AuthError::PasswordMismatch);
        }
        self.passwords.validate_password_strength(password)?;

        let (stored, user) = self.resolve_with_user(user_id, token).await?;
        let hash = self.passwords.hash_password(password)?;

        if !self.tokens.consume_with_password(stored.id, user_id, &hash).await? {
            warn!(user_id, token_id = %short_id(&stored.token), "Reset token consumed concurrently");
            return Err(AuthError::ResetTokenInvalid);
        }

        info!(user_id, token_id = %short_id(&stored.token), "Password reset completed");

        dispatch(
            &self.notifier,
            Notification::PasswordChanged {
                user_id,
                email: user.email.clone(),
                display_name: user.display_name().to_string(),
            },
        );

        Ok(())
    }
}
