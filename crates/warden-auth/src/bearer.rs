//! Bearer Token Manager
//!
//! Opaque OAuth2 password-grant tokens. Each issuance produces an
//! access/refresh pair of independent random strings; the store only ever
//! sees their SHA-256 digests:
//!
//! ```text
//! AT:<digest(access)>  -> BearerToken   (TTL = access TTL)
//! RT:<digest(refresh)> -> BearerToken   (TTL = refresh TTL)
//! ```
//!
//! A token authenticates iff its record is still in the store and
//! `now < expireAt`. Revocation deletes both keys.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use warden_db::kv::keys;
use warden_db::{Clock, CredentialStore, DbError, UserRecord, UserRepository};

use crate::config::BearerConfig;
use crate::error::{AuthError, AuthResult};
use crate::token::{chrono_ttl, digest, generate_token, short_id};
use crate::types::{AuthMethod, AuthenticatedUser, BearerToken, IssuedTokens};

/// Issues, validates and revokes bearer token pairs
#[derive(Clone)]
pub struct BearerTokenManager {
    store: CredentialStore,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    config: BearerConfig,
}

impl BearerTokenManager {
    pub fn new(
        store: CredentialStore,
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        config: BearerConfig,
    ) -> Self {
        Self {
            store,
            users,
            clock,
            config,
        }
    }

    /// Issue a fresh access/refresh pair for an already authenticated user
    pub async fn issue(&self, user: &UserRecord) -> AuthResult<IssuedTokens> {
        let access_token = generate_token(self.config.token_length);
        let refresh_token = generate_token(self.config.token_length);

        let now = self.clock.now();
        let record = BearerToken {
            id: digest(&access_token),
            owner_id: user.id,
            refresh_id: digest(&refresh_token),
            token_type: BearerToken::TOKEN_TYPE.to_string(),
            scopes: Vec::new(),
            expire_at: now + chrono_ttl(self.config.access_token_ttl)?,
            expires_in: self.config.access_token_ttl.as_secs(),
            refresh_expire_at: now + chrono_ttl(self.config.refresh_token_ttl)?,
        };

        let access_key = self.store.key(keys::ACCESS_TOKEN, &record.id);
        let refresh_key = self.store.key(keys::REFRESH_TOKEN, &record.refresh_id);

        self.store
            .set_json(&access_key, &record, self.config.access_token_ttl)
            .await?;

        if let Err(e) = self
            .store
            .set_json(&refresh_key, &record, self.config.refresh_token_ttl)
            .await
        {
            // Never leave half a pair behind
            if let Err(cleanup) = self.store.delete(&access_key).await {
                error!(token_id = %short_id(&record.id), error = %cleanup, "Failed to remove orphaned access token");
            }
            return Err(e.into());
        }

        info!(
            user_id = user.id,
            token_id = %short_id(&record.id),
            "Bearer token issued"
        );

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            token_type: record.token_type,
            expires_in: record.expires_in,
        })
    }

    /// Resolve an access token to its owner.
    ///
    /// `Ok(None)` covers unknown and expired tokens. Store failures and
    /// undecodable records are errors, never anonymous.
    pub async fn validate(&self, access_token: &str) -> AuthResult<Option<AuthenticatedUser>> {
        let id = digest(access_token);
        let key = self.store.key(keys::ACCESS_TOKEN, &id);

        let record = match self.store.get_json::<BearerToken>(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(token_id = %short_id(&id), "Bearer token not found");
                return Ok(None);
            }
            Err(DbError::Serialization(e)) => {
                error!(token_id = %short_id(&id), error = %e, "Malformed bearer token record");
                return Err(AuthError::InvalidTokenData);
            }
            Err(e) => {
                error!(token_id = %short_id(&id), error = %e, "Bearer token lookup failed");
                return Err(e.into());
            }
        };

        if record.id != id {
            error!(token_id = %short_id(&id), "Bearer token record does not match its key");
            return Err(AuthError::InvalidTokenData);
        }

        if !record.is_valid_at(self.clock.now()) {
            debug!(token_id = %short_id(&id), "Bearer token expired");
            return Ok(None);
        }

        let user = self
            .users
            .find_by_id(record.owner_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.can_sign_in() {
            warn!(user_id = user.id, "Rejected bearer token of blocked or inactive user");
            return Err(AuthError::AccountBlocked);
        }

        Ok(Some(AuthenticatedUser::from_record(&user, AuthMethod::Bearer)))
    }

    /// Delete an access token and its paired refresh token.
    ///
    /// Returns whether the access token was still present.
    pub async fn revoke(&self, access_token: &str) -> AuthResult<bool> {
        let id = digest(access_token);
        let key = self.store.key(keys::ACCESS_TOKEN, &id);

        let record = match self.store.get_json_primary::<BearerToken>(&key).await {
            Ok(record) => record,
            Err(DbError::Serialization(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let existed = self.store.delete(&key).await?;

        if let Some(record) = record {
            self.store
                .delete(&self.store.key(keys::REFRESH_TOKEN, &record.refresh_id))
                .await?;
            info!(user_id = record.owner_id, token_id = %short_id(&id), "Bearer token revoked");
        }

        Ok(existed)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The refresh token is single use: the caller that deletes its key wins,
    /// every other caller gets [`AuthError::InvalidRefreshToken`].
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(IssuedTokens, UserRecord)> {
        let refresh_id = digest(refresh_token);
        let key = self.store.key(keys::REFRESH_TOKEN, &refresh_id);

        let record = match self.store.get_json_primary::<BearerToken>(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AuthError::InvalidRefreshToken),
            Err(DbError::Serialization(e)) => {
                error!(token_id = %short_id(&refresh_id), error = %e, "Malformed refresh token record");
                return Err(AuthError::InvalidTokenData);
            }
            Err(e) => return Err(e.into()),
        };

        if record.refresh_id != refresh_id {
            error!(token_id = %short_id(&refresh_id), "Refresh token record does not match its key");
            return Err(AuthError::InvalidTokenData);
        }

        if !self.store.delete(&key).await? {
            // Consumed concurrently
            return Err(AuthError::InvalidRefreshToken);
        }
        self.store
            .delete(&self.store.key(keys::ACCESS_TOKEN, &record.id))
            .await?;

        if !record.refresh_valid_at(self.clock.now()) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .users
            .find_by_id(record.owner_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !user.can_sign_in() {
            return Err(AuthError::AccountBlocked);
        }

        let tokens = self.issue(&user).await?;
        Ok((tokens, user))
    }
}

/// Extract the token from `Authorization: <scheme> <token>`.
///
/// The header must split into exactly two space-separated parts; the scheme
/// itself is not checked. Anything else means no credential.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_scheme), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
