//! API error handling
//!
//! Credential failures keep the status and code assigned by [`AuthError`];
//! request-shape problems are reported as 400.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use warden_auth::{AuthError, ErrorResponse};

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::MissingParameter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::Auth(e) => ErrorResponse::from(e),
            Self::MissingParameter(_) => ErrorResponse {
                code: "MISSING_PARAMETER".to_string(),
                message: self.to_string(),
                retry_after: None,
            },
            Self::BadRequest(_) => ErrorResponse {
                code: "BAD_REQUEST".to_string(),
                message: self.to_string(),
                retry_after: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Auth(e) = &self {
            if e.is_server_error() {
                tracing::error!(error = %e, "Request failed");
            }
        }

        let status = self.status_code();
        let body = self.body();
        let retry_after = body.retry_after;

        let mut response = (status, Json(body)).into_response();

        // Add Retry-After header for lockouts
        if let Some(retry_after) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_keep_their_status() {
        assert_eq!(ApiError::from(AuthError::ResetTokenInvalid).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(AuthError::InvalidTokenData).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(AuthError::ThrottleUnavailable).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::MissingParameter("password".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_lockout_sets_retry_after() {
        let response = ApiError::from(AuthError::AccountLocked { retry_after: 90 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "90");
    }
}
