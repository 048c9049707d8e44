//! Media handlers: registration, status, enrichment and derived artefacts.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use storycut_models::{
    ClipCandidate, Job, JobInput, JobKind, JobStatus, Media, MediaId, MediaStatus, Scene,
    TechnicalMetadata, Transcript,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterMediaRequest {
    #[validate(length(min = 1, message = "source_uri must not be empty"))]
    pub source_uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterMediaResponse {
    pub media_id: MediaId,
    pub status: String,
}

/// Register a media and enqueue its probe.
pub async fn register_media(
    State(state): State<AppState>,
    Json(request): Json<RegisterMediaRequest>,
) -> ApiResult<Json<RegisterMediaResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request("InvalidRequest", e.to_string()))?;

    let mut media = Media::new(request.source_uri);
    if let Some(title) = request.title {
        media = media.with_title(title);
    }
    if let Some(description) = request.description {
        media = media.with_description(description);
    }
    let media_id = media.media_id.clone();
    let status = media.status;

    state.ctx.registry.create_media(media).await?;
    state
        .ctx
        .submit_job(media_id.clone(), JobInput::Probe)
        .await?;

    info!(media_id = %media_id, "media registered");
    Ok(Json(RegisterMediaResponse {
        media_id,
        status: status.as_str().to_string(),
    }))
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct ArtefactFlags {
    pub transcript: bool,
    pub silence_map: bool,
    pub scene_cuts: bool,
    pub frames: bool,
    pub scenes: bool,
    pub clip_candidates: bool,
}

#[derive(Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub kind: String,
    pub status: String,
    pub attempt: u32,
}

#[derive(Serialize)]
pub struct MediaResponse {
    pub media_id: MediaId,
    pub source_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub artefacts: ArtefactFlags,
    pub jobs: Vec<JobSummary>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Fetch a non-deleted media record or 404.
pub(crate) async fn live_media(state: &AppState, media_id: &MediaId) -> ApiResult<Media> {
    match state.ctx.registry.get_media(media_id).await? {
        Some(media) if media.status != MediaStatus::Deleted => Ok(media),
        _ => Err(ApiError::not_found(format!("media {}", media_id))),
    }
}

pub async fn get_media(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> ApiResult<Json<MediaResponse>> {
    let media_id = MediaId::from_string(media_id);
    let media = live_media(&state, &media_id).await?;
    let registry = &state.ctx.registry;

    let artefacts = ArtefactFlags {
        transcript: registry.get_transcript(&media_id).await?.is_some(),
        silence_map: registry.get_silence_map(&media_id).await?.is_some(),
        scene_cuts: registry.get_scene_cuts(&media_id).await?.is_some(),
        frames: registry.get_frames(&media_id).await?.is_some(),
        scenes: registry.get_scenes(&media_id).await?.is_some(),
        clip_candidates: registry.get_clip_candidates(&media_id).await?.is_some(),
    };

    let jobs = registry
        .list_jobs_by_media(&media_id)
        .await?
        .into_iter()
        .map(|j| JobSummary {
            job_id: j.job_id.to_string(),
            kind: j.kind.as_str().to_string(),
            status: j.status.as_str().to_string(),
            attempt: j.attempt,
        })
        .collect();

    Ok(Json(MediaResponse {
        media_id: media.media_id.clone(),
        source_uri: media.source_uri.clone(),
        title: media.title.clone(),
        description: media.description.clone(),
        status: media.status.as_str().to_string(),
        technical: media.technical.clone(),
        error: media.error.clone(),
        artefacts,
        jobs,
        created_at: media.created_at,
        updated_at: media.updated_at,
    }))
}

/// Soft delete. Derived entities stay but become unreachable.
pub async fn delete_media(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_id = MediaId::from_string(media_id);
    live_media(&state, &media_id).await?;
    state.ctx.registry.soft_delete_media(&media_id).await?;
    info!(media_id = %media_id, "media soft-deleted");
    Ok(Json(serde_json::json!({"media_id": media_id, "status": "deleted"})))
}

// ============================================================================
// Enrichment
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub kinds: Vec<String>,
}

#[derive(Serialize)]
pub struct EnrichResponse {
    pub enqueued: Vec<JobSummary>,
    pub skipped: Vec<String>,
}

/// Parse an enrichment kind name leniently: `Transcribe`,
/// `detect_silence` and `DetectSilence` all resolve.
fn parse_enrichment_kind(name: &str) -> Option<JobKind> {
    let normalised: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let kind = match normalised.as_str() {
        "transcribe" => JobKind::Transcribe,
        "detectsilence" => JobKind::DetectSilence,
        "detectscenes" => JobKind::DetectScenes,
        "describeframes" => JobKind::DescribeFrames,
        "indexscenes" => JobKind::IndexScenes,
        "selectclips" => JobKind::SelectClips,
        _ => return None,
    };
    Some(kind)
}

/// Whether this enrichment kind's artefact already exists.
async fn artefact_exists(state: &AppState, media_id: &MediaId, kind: JobKind) -> ApiResult<bool> {
    let registry = &state.ctx.registry;
    Ok(match kind {
        JobKind::Transcribe => registry.get_transcript(media_id).await?.is_some(),
        JobKind::DetectSilence => registry.get_silence_map(media_id).await?.is_some(),
        JobKind::DetectScenes => registry.get_scene_cuts(media_id).await?.is_some(),
        JobKind::DescribeFrames => registry.get_frames(media_id).await?.is_some(),
        JobKind::IndexScenes => registry.get_scenes(media_id).await?.is_some(),
        JobKind::SelectClips => registry.get_clip_candidates(media_id).await?.is_some(),
        _ => false,
    })
}

/// Enqueue the requested enrichment kinds that are not already completed
/// and have no active job.
pub async fn enrich_media(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<Json<EnrichResponse>> {
    let media_id = MediaId::from_string(media_id);
    live_media(&state, &media_id).await?;

    if request.kinds.is_empty() {
        return Err(ApiError::bad_request("InvalidRequest", "no kinds requested"));
    }

    let mut kinds = Vec::with_capacity(request.kinds.len());
    for name in &request.kinds {
        let kind = parse_enrichment_kind(name).ok_or_else(|| {
            ApiError::bad_request(
                "InvalidRequest",
                format!("unknown enrichment kind '{}'", name),
            )
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    let active: Vec<Job> = state
        .ctx
        .registry
        .list_jobs_by_media(&media_id)
        .await?
        .into_iter()
        .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
        .collect();

    let mut enqueued = Vec::new();
    let mut skipped = Vec::new();
    for kind in kinds {
        if artefact_exists(&state, &media_id, kind).await?
            || active.iter().any(|j| j.kind == kind)
        {
            skipped.push(kind.as_str().to_string());
            continue;
        }
        let input = JobInput::for_enrichment(kind)
            .ok_or_else(|| ApiError::internal("non-enrichment kind slipped through"))?;
        let job = state.ctx.submit_job(media_id.clone(), input).await?;
        enqueued.push(JobSummary {
            job_id: job.job_id.to_string(),
            kind: kind.as_str().to_string(),
            status: job.status.as_str().to_string(),
            attempt: job.attempt,
        });
    }

    Ok(Json(EnrichResponse { enqueued, skipped }))
}

// ============================================================================
// Derived artefacts
// ============================================================================

pub async fn get_transcript(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> ApiResult<Json<Transcript>> {
    let media_id = MediaId::from_string(media_id);
    live_media(&state, &media_id).await?;
    state
        .ctx
        .registry
        .get_transcript(&media_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("transcript"))
}

pub async fn get_scenes(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> ApiResult<Json<Vec<Scene>>> {
    let media_id = MediaId::from_string(media_id);
    live_media(&state, &media_id).await?;
    state
        .ctx
        .registry
        .get_scenes(&media_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("scenes"))
}

/// Clip candidates; an unenriched media simply has none yet.
pub async fn get_candidates(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> ApiResult<Json<Vec<ClipCandidate>>> {
    let media_id = MediaId::from_string(media_id);
    live_media(&state, &media_id).await?;
    let candidates = state
        .ctx
        .registry
        .get_clip_candidates(&media_id)
        .await?
        .unwrap_or_default();
    Ok(Json(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_kind_names_are_lenient() {
        assert_eq!(parse_enrichment_kind("Transcribe"), Some(JobKind::Transcribe));
        assert_eq!(
            parse_enrichment_kind("detect_silence"),
            Some(JobKind::DetectSilence)
        );
        assert_eq!(
            parse_enrichment_kind("DetectScenes"),
            Some(JobKind::DetectScenes)
        );
        assert_eq!(
            parse_enrichment_kind("select-clips"),
            Some(JobKind::SelectClips)
        );
        assert_eq!(parse_enrichment_kind("probe"), None);
        assert_eq!(parse_enrichment_kind("apply_plan"), None);
        assert_eq!(parse_enrichment_kind("nonsense"), None);
    }
}
