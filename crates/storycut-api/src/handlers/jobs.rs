//! Job status and cancellation.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use storycut_models::{JobId, JobStatus};
use storycut_registry::JobPatch;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub media_id: String,
    pub kind: String,
    pub status: String,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<storycut_models::JobError>,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn job_response(job: storycut_models::Job) -> JobResponse {
    JobResponse {
        job_id: job.job_id.to_string(),
        media_id: job.media_id.to_string(),
        kind: job.kind.as_str().to_string(),
        status: job.status.as_str().to_string(),
        attempt: job.attempt,
        result: job.result,
        error: job.error,
        enqueued_at: job.enqueued_at,
        started_at: job.started_at,
        finished_at: job.finished_at,
    }
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::from_string(job_id);
    state
        .ctx
        .registry
        .get_job(&job_id)
        .await?
        .map(|j| Json(job_response(j)))
        .ok_or_else(|| ApiError::not_found(format!("job {}", job_id)))
}

/// Request cancellation. A queued job terminates immediately; a running
/// one observes the flag at its next safe point.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::from_string(job_id);
    let job = state
        .ctx
        .registry
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {}", job_id)))?;

    if job.status.is_terminal() {
        return Ok(Json(job_response(job)));
    }

    let job = state.ctx.registry.request_job_cancel(&job_id).await?;

    // Queued -> Cancelled is immediate; losing the race to a claiming
    // worker is fine, the flag still takes effect cooperatively
    let job = if job.status == JobStatus::Queued {
        state
            .ctx
            .registry
            .update_job_if_status(
                &job_id,
                JobStatus::Queued,
                JobStatus::Cancelled,
                JobPatch::default(),
            )
            .await
            .unwrap_or(job)
    } else {
        job
    };

    info!(job_id = %job_id, status = %job.status, "cancellation requested");
    Ok(Json(job_response(job)))
}
