//! Probe handler: fill in technical metadata for a registered media.

use serde_json::{json, Value};
use tracing::info;

use storycut_media::probe_source;
use storycut_models::{Job, MediaStatus, TechnicalMetadata};
use storycut_registry::MediaPatch;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

pub async fn run(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    let media = ctx
        .registry
        .get_media(&job.media_id)
        .await?
        .ok_or_else(|| WorkerError::invalid_request(format!("unknown media {}", job.media_id)))?;

    // Idempotency: an already-probed media completes immediately
    if media.technical.is_some() {
        return Ok(Some(json!({"already_probed": true})));
    }

    // Claim the probe via Registered -> Probing; a conflict means another
    // attempt got here first
    let media = match ctx
        .registry
        .update_media_if_status(
            &job.media_id,
            MediaStatus::Registered,
            MediaStatus::Probing,
            MediaPatch::default(),
        )
        .await
    {
        Ok(m) => m,
        Err(e) if e.is_conflict() => {
            // Re-read: either probed already or a probe is in flight
            let current = ctx.registry.get_media(&job.media_id).await?;
            match current.and_then(|m| m.technical) {
                Some(_) => return Ok(Some(json!({"already_probed": true}))),
                None => return Err(WorkerError::job_failed("media is not probeable")),
            }
        }
        Err(e) => return Err(e.into()),
    };

    let probe_result = tokio::time::timeout(
        std::time::Duration::from_secs(ctx.config.probe_timeout_s),
        probe_source(&media.source_uri),
    )
    .await;

    let info = match probe_result {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            let worker_err = WorkerError::from(e);
            ctx.registry
                .update_media_if_status(
                    &job.media_id,
                    MediaStatus::Probing,
                    MediaStatus::Failed,
                    MediaPatch::error(worker_err.to_string()),
                )
                .await?;
            return Err(worker_err);
        }
        Err(_) => {
            let worker_err = WorkerError::DeadlineExceeded(ctx.config.probe_timeout_s);
            ctx.registry
                .update_media_if_status(
                    &job.media_id,
                    MediaStatus::Probing,
                    MediaStatus::Failed,
                    MediaPatch::error(worker_err.to_string()),
                )
                .await?;
            return Err(worker_err);
        }
    };

    let technical = TechnicalMetadata {
        duration: info.duration,
        fps: info.fps,
        width: info.width,
        height: info.height,
        has_audio: info.has_audio,
        video_codec: info.video_codec,
        audio_codec: info.audio_codec,
        bitrate: info.bitrate,
    };

    // A zero-length source is probed but never becomes Ready; its metadata
    // still lands so enrichment can short-circuit to empty artefacts.
    let new_status = if technical.duration > 0.0 {
        MediaStatus::Ready
    } else {
        MediaStatus::Failed
    };
    let patch = if new_status == MediaStatus::Failed {
        MediaPatch {
            technical: Some(technical.clone()),
            error: Some("source has zero duration".to_string()),
        }
    } else {
        MediaPatch::technical(technical.clone())
    };

    ctx.registry
        .update_media_if_status(&job.media_id, MediaStatus::Probing, new_status, patch)
        .await?;

    info!(
        media_id = %job.media_id,
        duration = technical.duration,
        fps = technical.fps,
        has_audio = technical.has_audio,
        "media probed"
    );

    Ok(Some(serde_json::to_value(&technical)?))
}
