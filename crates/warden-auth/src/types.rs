//! Core authentication types
//!
//! Shared types used across all credential managers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_db::UserRecord;

// =============================================================================
// Principal
// =============================================================================

/// Authenticated user information resolved from a bearer token or session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    /// Authentication method used
    pub auth_method: AuthMethod,
}

impl AuthenticatedUser {
    pub fn from_record(user: &UserRecord, auth_method: AuthMethod) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            auth_method,
        }
    }
}

/// Authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// Session cookie
    Session,
}

// =============================================================================
// Bearer tokens
// =============================================================================

/// Stored bearer record. Written under both the access and the refresh key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BearerToken {
    /// Digest of the access token
    pub id: String,
    pub owner_id: i64,
    /// Digest of the refresh token
    pub refresh_id: String,
    pub token_type: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expire_at: DateTime<Utc>,
    /// Access TTL in seconds at issuance
    pub expires_in: u64,
    pub refresh_expire_at: DateTime<Utc>,
}

impl BearerToken {
    pub const TOKEN_TYPE: &'static str = "Bearer";

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expire_at
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_expire_at
    }
}

/// Raw credentials handed to the client, in OAuth2 token-response shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

// =============================================================================
// Login throttle
// =============================================================================

/// Read-only view of one throttle key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginThrottleStatus {
    /// `<ip>_<identifier>`
    pub key: String,
    /// Failures since the last success or lockout
    pub count: i64,
    /// Set while locked out
    pub wait_until: Option<DateTime<Utc>>,
}

impl LoginThrottleStatus {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.wait_until, Some(until) if now <= until)
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Stored session payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub uid: i64,
    pub created_at: DateTime<Utc>,
}
