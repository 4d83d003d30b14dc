//! Authentication Handlers
//!
//! Password/refresh grant, session login, logout and current user.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use warden_auth::{extract_bearer, AuthenticatedUser, ClientIp, OptionalUser};

use crate::dto::{GrantRequest, LoginRequest, LoginResponse, SuccessResponse, TokenResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// OAuth2 token endpoint
pub async fn grant_password(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(request): Json<GrantRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let grant = match request.grant_type.as_str() {
        "password" => {
            let username = request
                .username
                .ok_or_else(|| ApiError::MissingParameter("username".to_string()))?;
            let password = request
                .password
                .ok_or_else(|| ApiError::MissingParameter("password".to_string()))?;
            state.auth.grant.authenticate(&username, &password, &ip).await?
        }
        "refresh_token" => {
            let refresh_token = request
                .refresh_token
                .ok_or_else(|| ApiError::MissingParameter("refresh_token".to_string()))?;
            state.auth.grant.refresh(&refresh_token).await?
        }
        other => return Err(ApiError::BadRequest(format!("unsupported grant_type: {}", other))),
    };

    Ok(Json(grant.into()))
}

/// Session login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    let previous = state.auth.session.session_id(&headers);
    let login = state
        .auth
        .grant
        .login_session(&request.username, &request.password, &ip, previous.as_deref())
        .await?;

    Ok((
        AppendHeaders([(SET_COOKIE, login.session.cookie)]),
        Json(LoginResponse { user: login.user }),
    )
        .into_response())
}

/// Revoke the presented bearer token and/or session
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let access_token = extract_bearer(&headers);
    let session_id = state.auth.session.session_id(&headers);

    let removal = state.auth.grant.logout(access_token, session_id.as_deref()).await;

    tracing::info!(
        bearer = access_token.is_some(),
        session = session_id.is_some(),
        "Logout"
    );

    match removal {
        Some(cookie) => (AppendHeaders([(SET_COOKIE, cookie)]), Json(SuccessResponse::ok())).into_response(),
        None => Json(SuccessResponse::ok()).into_response(),
    }
}

/// Current principal, or `null` when anonymous
pub async fn current_user(OptionalUser(user): OptionalUser) -> Json<Option<AuthenticatedUser>> {
    Json(user)
}
