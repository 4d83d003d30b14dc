//! Authentication error types
//!
//! Every credential operation resolves to one of three caller-visible
//! outcomes: allow, deny with a reason, or server error. Errors are:
//! - Informative for logging/debugging
//! - Safe for external exposure (store and database details are hidden)
//! - Convertible to HTTP status codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_db::DbError;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Token Errors
    // =========================================================================
    /// Token is unknown, expired or belongs to a user that no longer exists
    #[error("Invalid token")]
    InvalidToken,

    /// Stored token record could not be decoded
    #[error("Invalid token data")]
    InvalidTokenData,

    /// Refresh token is unknown, expired or already used
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    // =========================================================================
    // Credential Errors
    // =========================================================================
    #[error("Invalid credentials")]
    InvalidCredentials,

    // =========================================================================
    // Password Errors
    // =========================================================================
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    #[error("Password verification failed")]
    PasswordVerificationFailed,

    #[error("Password hashing failed")]
    PasswordHashingFailed,

    // =========================================================================
    // Password Reset Errors
    // =========================================================================
    /// Reset token not found, superseded or already consumed
    #[error("Reset token not found or invalid")]
    ResetTokenInvalid,

    #[error("Unknown reset prefix: {0}")]
    InvalidResetPrefix(String),

    // =========================================================================
    // Login Throttle Errors
    // =========================================================================
    /// Too many failed attempts for this address and identifier
    #[error("Too many failed login attempts, try again in {retry_after} seconds")]
    AccountLocked {
        /// Seconds until attempts are accepted again
        retry_after: u64,
    },

    /// Throttle state could not be read; logins are refused until it can
    #[error("Login temporarily unavailable")]
    ThrottleUnavailable,

    // =========================================================================
    // Permission Errors
    // =========================================================================
    #[error("Authentication required")]
    Unauthenticated,

    // =========================================================================
    // User State Errors
    // =========================================================================
    #[error("Account is blocked")]
    AccountBlocked,

    #[error("User not found")]
    UserNotFound,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Credential store unreachable or timed out
    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not be exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::WeakPassword(_) | Self::PasswordMismatch | Self::InvalidResetPrefix(_) => 400,

            // 401 Unauthorized
            Self::InvalidToken
            | Self::InvalidRefreshToken
            | Self::InvalidCredentials
            | Self::PasswordVerificationFailed
            | Self::Unauthenticated => 401,

            // 403 Forbidden
            Self::InvalidTokenData | Self::AccountBlocked => 403,

            // 404 Not Found
            Self::UserNotFound | Self::ResetTokenInvalid => 404,

            // 429 Too Many Requests
            Self::AccountLocked { .. } => 429,

            // 500 Internal Server Error
            Self::Database(_) | Self::PasswordHashingFailed | Self::Config(_) | Self::Internal(_) => 500,

            // 503 Service Unavailable
            Self::Store(_) | Self::ThrottleUnavailable => 503,
        }
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidTokenData => "INVALID_TOKEN_DATA",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::PasswordMismatch => "PASSWORD_MISMATCH",
            Self::PasswordVerificationFailed => "INVALID_CREDENTIALS",
            Self::PasswordHashingFailed => "INTERNAL_ERROR",
            Self::ResetTokenInvalid => "RESET_TOKEN_INVALID",
            Self::InvalidResetPrefix(_) => "INVALID_RESET_PREFIX",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::ThrottleUnavailable => "SERVICE_UNAVAILABLE",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::AccountBlocked => "ACCOUNT_BLOCKED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Store(_) => "SERVICE_UNAVAILABLE",
            Self::Database(_) => "INTERNAL_ERROR",
            Self::Config(_) => "INTERNAL_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Get safe message for client (doesn't leak internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Store(_) | Self::Internal(_) | Self::Config(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Create an account locked error, rounding the wait up to whole seconds
    pub fn account_locked(remaining: std::time::Duration) -> Self {
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Self::AccountLocked {
            retry_after: secs.max(1),
        }
    }
}

/// Error response for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (machine-readable)
    pub code: String,
    /// Error message (human-readable)
    pub message: String,
    /// Retry-after in seconds (for lockouts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        let retry_after = match error {
            AuthError::AccountLocked { retry_after } => Some(*retry_after),
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.client_message(),
            retry_after,
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Redis(_) | DbError::Timeout(_) | DbError::Connection(_) => Self::Store(err.to_string()),
            DbError::Query(_) | DbError::Migration(_) | DbError::NotFound(_) => Self::Database(err.to_string()),
            DbError::Serialization(e) => Self::Internal(e),
            DbError::Config(e) => Self::Config(e),
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(_: argon2::password_hash::Error) -> Self {
        Self::PasswordVerificationFailed
    }
}
