//! Render handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use storycut_models::{AspectRatio, JobInput, PlanId, PlanStatus, RenderId, RenderStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub aspect_ratios: Vec<String>,
    #[serde(default)]
    pub captions: bool,
    #[serde(default)]
    pub normalise_audio: bool,
}

#[derive(Serialize)]
pub struct RenderJobResponse {
    pub render_job_id: String,
}

/// Enqueue per-ratio renders for a validated plan.
pub async fn render_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Json(request): Json<RenderRequest>,
) -> ApiResult<Json<RenderJobResponse>> {
    if request.aspect_ratios.is_empty() {
        return Err(ApiError::bad_request(
            "InvalidRequest",
            "aspect_ratios must not be empty",
        ));
    }
    let mut ratios = Vec::with_capacity(request.aspect_ratios.len());
    for raw in &request.aspect_ratios {
        let ratio: AspectRatio = raw.parse().map_err(|_| {
            ApiError::bad_request("InvalidRequest", format!("invalid aspect ratio '{}'", raw))
        })?;
        if !ratios.contains(&ratio) {
            ratios.push(ratio);
        }
    }

    let plan_id = PlanId::from_string(plan_id);
    let plan = state
        .ctx
        .registry
        .get_plan(&plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("plan {}", plan_id)))?;
    if matches!(plan.status, PlanStatus::Draft | PlanStatus::Rejected) {
        return Err(ApiError::Conflict(format!(
            "plan {} is not renderable (status {})",
            plan_id, plan.status
        )));
    }

    let job = state
        .ctx
        .submit_job(
            plan.media_id.clone(),
            JobInput::ApplyPlan {
                plan_id: plan_id.clone(),
                aspect_ratios: ratios,
                captions: request.captions,
                normalise_audio: request.normalise_audio,
            },
        )
        .await?;

    info!(plan_id = %plan_id, job_id = %job.job_id, "render queued");
    Ok(Json(RenderJobResponse {
        render_job_id: job.job_id.to_string(),
    }))
}

#[derive(Serialize)]
pub struct RenderResponse {
    pub render_id: RenderId,
    pub media_id: String,
    pub plan_id: String,
    pub aspect_ratio: String,
    pub status: String,
    /// Present only once the render completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<storycut_models::JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

pub async fn get_render(
    State(state): State<AppState>,
    Path(render_id): Path<String>,
) -> ApiResult<Json<RenderResponse>> {
    let render_id = RenderId::from_string(render_id);
    let render = state
        .ctx
        .registry
        .get_render(&render_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("render {}", render_id)))?;

    let output_uri = if render.status == RenderStatus::Completed {
        render.output_uri.clone()
    } else {
        None
    };

    Ok(Json(RenderResponse {
        render_id: render.render_id.clone(),
        media_id: render.media_id.to_string(),
        plan_id: render.plan_id.to_string(),
        aspect_ratio: render.aspect_ratio.to_string(),
        status: render.status.as_str().to_string(),
        output_uri,
        error: render.error.clone(),
        duration_seconds: render.duration_seconds,
    }))
}
