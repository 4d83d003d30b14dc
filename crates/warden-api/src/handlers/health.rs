//! Health Check Handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    pub status: String,
    pub version: String,
    /// Absent when no relational pool is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<bool>,
    pub kv_writer: bool,
    pub kv_reader: bool,
    /// Unix millis
    pub timestamp: i64,
}

/// Store connectivity. 503 when any configured store is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (kv_writer, kv_reader) = state.store.health().await;
    let postgres = match &state.db {
        Some(db) => Some(db.health_check().await.postgres),
        None => None,
    };

    let healthy = kv_writer && kv_reader && postgres.unwrap_or(true);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            postgres,
            kv_writer,
            kv_reader,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }),
    )
}
