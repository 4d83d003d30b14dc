//! Relational row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub blocked: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Active, unblocked user with the default `authenticated` role
    pub fn new(id: i64, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            email: email.into(),
            display_name: None,
            active: true,
            blocked: false,
            roles: vec!["authenticated".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and not blocked. Every credential path checks this.
    pub fn can_sign_in(&self) -> bool {
        self.active && !self.blocked
    }

    /// Name used in notifications
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

// ============================================================================
// Auth tokens (password reset and federated login handshakes)
// ============================================================================

/// Stored one-time token. `token` holds the SHA-256 digest of the value
/// handed to the user, never the value itself.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetToken {
    pub id: i64,
    pub user_id: i64,
    pub provider_user_id: Option<String>,
    pub token_provider_id: Option<String>,
    pub token_type: String,
    pub token: String,
    pub is_valid: bool,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for [`ResetToken`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResetToken {
    pub user_id: i64,
    pub token_type: String,
    pub token: String,
    pub provider_user_id: Option<String>,
    pub token_provider_id: Option<String>,
    pub redirect_url: Option<String>,
}

impl NewResetToken {
    pub fn new(user_id: i64, token_type: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token_type: token_type.into(),
            token: token.into(),
            provider_user_id: None,
            token_provider_id: None,
            redirect_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_token_json_uses_camel_case() {
        let now = Utc::now();
        let token = ResetToken {
            id: 7,
            user_id: 3,
            provider_user_id: None,
            token_provider_id: Some("facebook".to_string()),
            token_type: "resetPassword".to_string(),
            token: "ab".repeat(32),
            is_valid: true,
            redirect_url: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["userId"], 3);
        assert_eq!(json["tokenType"], "resetPassword");
        assert_eq!(json["isValid"], true);

        let back: ResetToken = serde_json::from_value(json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user = UserRecord::new(1, "bob", "bob@example.com");
        assert_eq!(user.display_name(), "bob");

        user.display_name = Some("Bob B.".to_string());
        assert_eq!(user.display_name(), "Bob B.");
    }
}
