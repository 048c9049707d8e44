//! Health and readiness probes.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub queue_depth: u64,
    pub dead_letter_depth: u64,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness includes queue depths so operators see a backlog at a glance.
pub async fn ready(State(state): State<AppState>) -> ApiResult<Json<ReadyResponse>> {
    let queue_depth = state
        .ctx
        .queue
        .len()
        .await
        .map_err(|e| crate::error::ApiError::internal(e.to_string()))?;
    let dead_letter_depth = state
        .ctx
        .queue
        .dlq_len()
        .await
        .map_err(|e| crate::error::ApiError::internal(e.to_string()))?;

    Ok(Json(ReadyResponse {
        status: "ready",
        queue_depth,
        dead_letter_depth,
    }))
}
