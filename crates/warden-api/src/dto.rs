//! Request and response bodies

use serde::{Deserialize, Serialize};
use warden_auth::{AuthenticatedUser, GrantResponse};

// =============================================================================
// Grants
// =============================================================================

fn default_grant_type() -> String {
    "password".to_string()
}

/// OAuth2 token request (`password` or `refresh_token` grant)
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    /// Username or email
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

/// OAuth2 token response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user_id: i64,
}

impl From<GrantResponse> for TokenResponse {
    fn from(grant: GrantResponse) -> Self {
        Self {
            access_token: grant.tokens.access_token,
            refresh_token: grant.tokens.refresh_token,
            token_type: grant.tokens.token_type,
            expires_in: grant.tokens.expires_in,
            user_id: grant.user.user_id,
        }
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: AuthenticatedUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// =============================================================================
// Password reset
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    /// Username or email
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    /// Named link template
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub t: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResetResponse {
    pub user_id: i64,
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResetRequest {
    /// Token from the link
    #[serde(alias = "t")]
    pub token: String,
    pub password: String,
    #[serde(alias = "confirmation")]
    pub confirm_password: String,
}
