//! Forgot-password Handlers
//!
//! ```text
//! POST /auth/forgot-password                      request   -> link sent
//! GET  /auth/:user_id/forgot-password/reset?t=    resolve   -> link still valid?
//! POST /auth/:user_id/forgot-password/reset       commit    -> password changed
//! ```

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::dto::{CommitResetRequest, ForgotPasswordRequest, ResetQuery, ResolveResetResponse, SuccessResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Step 1. The token only travels in the notification, never in the response.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .auth
        .reset
        .request(&request.identifier, request.prefix.as_deref())
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// Step 2
pub async fn resolve_reset(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(query): Query<ResetQuery>,
) -> ApiResult<Json<ResolveResetResponse>> {
    let token = state.auth.reset.resolve(user_id, &query.t).await?;

    Ok(Json(ResolveResetResponse {
        user_id: token.user_id,
        valid: token.is_valid,
    }))
}

/// Step 3
pub async fn commit_reset(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(request): Json<CommitResetRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .auth
        .reset
        .commit(user_id, &request.token, &request.password, &request.confirm_password)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
