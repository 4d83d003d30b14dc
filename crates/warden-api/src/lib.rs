//! Warden REST API
//!
//! HTTP surface over the credential managers in `warden-auth`.
//!
//! # API Structure
//!
//! ```text
//! /auth
//! ├── POST /grant-password/authenticate      - OAuth2 password and refresh grants
//! ├── GET|POST /logout                       - Revoke bearer token and session
//! ├── GET  /current                          - Current principal or null
//! ├── POST /forgot-password                  - Send a reset link
//! └── GET|POST /:user_id/forgot-password/reset - Resolve / commit a reset
//! POST /login                                - Session login
//! GET  /health                               - Store connectivity
//! ```
//!
//! # Authentication Methods
//!
//! - **Bearer Token**: opaque access token in the Authorization header
//! - **Session**: cookie holding the session id

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
    /// Enable request tracing
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_tracing: true,
        }
    }
}

/// Create the main API router with all middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let auth_layer = state.auth.layer();

    let mut router = routes::all_routes().with_state(state).layer(auth_layer);

    let x_request_id = HeaderName::from_static("x-request-id");
    router = router
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id));

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");

            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }));
    }

    if config.enable_cors {
        let cors = if config.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::permissive()
        } else {
            // Cookies need credentials, which rule out wildcard origins
            CorsLayer::new()
                .allow_origin(
                    config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
                .allow_credentials(true)
        };
        router = router.layer(cors);
    }

    router
}

/// Router without tracing or CORS
pub fn create_test_router(state: Arc<AppState>) -> Router {
    create_router(
        state,
        ApiConfig {
            enable_cors: false,
            cors_origins: vec![],
            enable_tracing: false,
        },
    )
}
