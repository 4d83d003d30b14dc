//! API Routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// `/auth/*` routes
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/grant-password/authenticate", post(handlers::auth::grant_password))
        .route("/logout", get(handlers::auth::logout).post(handlers::auth::logout))
        .route("/current", get(handlers::auth::current_user))
        .route("/forgot-password", post(handlers::password_reset::forgot_password))
        .route(
            "/:user_id/forgot-password/reset",
            get(handlers::password_reset::resolve_reset).post(handlers::password_reset::commit_reset),
        )
}

/// Every route, without middleware
pub fn all_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth_routes())
        .route("/login", post(handlers::auth::login))
        .route("/health", get(handlers::health::health_check))
}
