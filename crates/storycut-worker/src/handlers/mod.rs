//! Kind-specific job handlers.
//!
//! Every handler is idempotent: it first checks whether its output already
//! exists in the registry and short-circuits to completion if so, which
//! makes at-least-once delivery effectively-once.

pub mod enrich;
pub mod plan;
pub mod probe;
pub mod render;

use serde_json::Value;

use storycut_models::{Job, JobInput, Media, MediaId, TechnicalMetadata};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

/// Run the handler for one claimed job. Returns the result payload stored
/// on the completed job record.
pub async fn dispatch(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    match &job.input {
        JobInput::Probe => probe::run(ctx, job).await,
        JobInput::Transcribe => enrich::transcribe(ctx, job).await,
        JobInput::DetectSilence => enrich::detect_silence(ctx, job).await,
        JobInput::DetectScenes => enrich::detect_scenes(ctx, job).await,
        JobInput::DescribeFrames => enrich::describe_frames(ctx, job).await,
        JobInput::IndexScenes => enrich::index_scenes(ctx, job).await,
        JobInput::SelectClips => enrich::select_clips(ctx, job).await,
        JobInput::PlanHeuristic { .. } => plan::heuristic(ctx, job).await,
        JobInput::PlanStory { .. } => plan::story(ctx, job).await,
        JobInput::ApplyPlan { .. } => render::apply_plan(ctx, job).await,
    }
}

/// Fetch a media record that has been probed. Enrichment and planning
/// handlers refuse to run against unprobed or deleted media.
pub(crate) async fn probed_media(
    ctx: &ProcessingContext,
    media_id: &MediaId,
) -> WorkerResult<(Media, TechnicalMetadata)> {
    let media = ctx
        .registry
        .get_media(media_id)
        .await?
        .ok_or_else(|| WorkerError::invalid_request(format!("unknown media {}", media_id)))?;
    let technical = media
        .technical
        .clone()
        .ok_or_else(|| WorkerError::invalid_request(format!("media {} not probed", media_id)))?;
    Ok((media, technical))
}
