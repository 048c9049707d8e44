//! Plan generation handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use storycut_models::{JobInput, MediaId, Plan, PlanId, StoryBrief};

use crate::error::{ApiError, ApiResult};
use crate::handlers::media::live_media;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PlanJobResponse {
    pub plan_job_id: String,
}

// ============================================================================
// Heuristic plans
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct HeuristicPlanRequest {
    /// Index into the stored clip candidates
    pub candidate_index: Option<usize>,
    /// Free-form `(start, end)` window in seconds
    pub window: Option<(f64, f64)>,
}

/// Generate a plan from a selected candidate or free-form window.
pub async fn plan_heuristic(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
    Json(request): Json<HeuristicPlanRequest>,
) -> ApiResult<Json<PlanJobResponse>> {
    let media_id = MediaId::from_string(media_id);
    let media = live_media(&state, &media_id).await?;

    // Impossible inputs fail synchronously, before any work is queued
    match media.technical.as_ref() {
        None => {
            return Err(ApiError::bad_request(
                "InvalidRequest",
                "media has not been probed yet",
            ))
        }
        Some(t) if t.duration <= 0.0 => {
            return Err(ApiError::bad_request("EmptySource", "source has no timeline"))
        }
        Some(_) => {}
    }

    if let Some((start, end)) = request.window {
        if !(start >= 0.0 && end > start) {
            return Err(ApiError::bad_request(
                "InvalidRequest",
                format!("invalid window [{}, {}]", start, end),
            ));
        }
    }

    let job = state
        .ctx
        .submit_job(
            media_id.clone(),
            JobInput::PlanHeuristic {
                candidate_index: request.candidate_index,
                window: request.window,
            },
        )
        .await?;

    info!(media_id = %media_id, job_id = %job.job_id, "heuristic plan queued");
    Ok(Json(PlanJobResponse {
        plan_job_id: job.job_id.to_string(),
    }))
}

// ============================================================================
// Story plans
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct StoryPlanRequest {
    #[validate(length(min = 1, message = "story_prompt must not be empty"))]
    pub story_prompt: String,
    pub summary: Option<String>,
    pub target_audience: Option<String>,
    pub tone: Option<String>,
    pub key_message: Option<String>,
    #[serde(default)]
    pub story_arc: Vec<String>,
    #[serde(default)]
    pub style_preferences: Vec<String>,
    /// Target output length as a fraction of source duration, in (0, 1]
    #[validate(range(min = 0.01, max = 1.0, message = "desired_length_pct must be in (0, 1]"))]
    pub desired_length_pct: f64,
    /// Reject rather than warn on out-of-band coverage
    #[serde(default)]
    pub strict_coverage: bool,
}

/// Run the compress -> prompt -> model -> validate chain asynchronously.
pub async fn plan_story(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
    Json(request): Json<StoryPlanRequest>,
) -> ApiResult<Json<PlanJobResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request("InvalidRequest", e.to_string()))?;

    let media_id = MediaId::from_string(media_id);
    let media = live_media(&state, &media_id).await?;
    match media.technical.as_ref() {
        None => {
            return Err(ApiError::bad_request(
                "InvalidRequest",
                "media has not been probed yet",
            ))
        }
        Some(t) if t.duration <= 0.0 => {
            return Err(ApiError::bad_request("EmptySource", "source has no timeline"))
        }
        Some(_) => {}
    }

    let brief = StoryBrief {
        story_prompt: request.story_prompt,
        summary: request.summary,
        target_audience: request.target_audience,
        tone: request.tone,
        key_message: request.key_message,
        story_arc: request.story_arc,
        style_preferences: request.style_preferences,
        desired_length_pct: request.desired_length_pct,
        strict_coverage: request.strict_coverage,
    };

    let job = state
        .ctx
        .submit_job(media_id.clone(), JobInput::PlanStory { brief })
        .await?;

    info!(media_id = %media_id, job_id = %job.job_id, "story plan queued");
    Ok(Json(PlanJobResponse {
        plan_job_id: job.job_id.to_string(),
    }))
}

// ============================================================================
// Plan lookup
// ============================================================================

/// The validated plan: EDL, warnings, story arc, recommendations.
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Plan>> {
    let plan_id = PlanId::from_string(plan_id);
    state
        .ctx
        .registry
        .get_plan(&plan_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("plan {}", plan_id)))
}
