//! Job preconditions over registry state.
//!
//! Cross-kind ordering is not enforced by the queue; a worker that claims
//! a job whose preconditions do not hold re-enqueues it with a short delay.

use storycut_models::{Job, JobInput, JobKind, MediaStatus};

use crate::context::ProcessingContext;
use crate::error::WorkerResult;

/// Whether the registry state a job depends on is in place.
pub async fn preconditions_met(ctx: &ProcessingContext, job: &Job) -> WorkerResult<bool> {
    let media_id = &job.media_id;

    // Probe only needs the media record itself
    if job.kind == JobKind::Probe {
        return Ok(ctx.registry.get_media(media_id).await?.is_some());
    }

    // Everything else needs a probed, non-deleted media
    let media = match ctx.registry.get_media(media_id).await? {
        Some(m) if m.status != MediaStatus::Deleted => m,
        _ => return Ok(false),
    };
    if media.technical.is_none() {
        return Ok(false);
    }

    match &job.input {
        JobInput::IndexScenes => {
            // Needs both scene cuts and described frames
            Ok(ctx.registry.get_scene_cuts(media_id).await?.is_some()
                && ctx.registry.get_frames(media_id).await?.is_some())
        }
        JobInput::SelectClips => {
            // Needs transcript and silence map; scene cuts are optional
            Ok(ctx.registry.get_transcript(media_id).await?.is_some()
                && ctx.registry.get_silence_map(media_id).await?.is_some())
        }
        JobInput::ApplyPlan { plan_id, .. } => {
            Ok(ctx.registry.get_plan(plan_id).await?.is_some())
        }
        // Plain enrichment and planning run against the probed media alone
        _ => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use storycut_models::{Media, MediaId, SceneCuts, SilenceMap, TechnicalMetadata, Transcript};

    async fn probed_media(ctx: &ProcessingContext) -> MediaId {
        let mut media = Media::new("file:///v.mp4");
        media.status = MediaStatus::Ready;
        media.technical = Some(TechnicalMetadata {
            duration: 60.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
            has_audio: true,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            bitrate: 0,
        });
        let id = media.media_id.clone();
        ctx.registry.create_media(media).await.unwrap();
        id
    }

    #[tokio::test]
    async fn select_clips_waits_for_transcript_and_silence() {
        let ctx = test_context();
        let media_id = probed_media(&ctx).await;
        let job = Job::new(media_id.clone(), JobInput::SelectClips);

        assert!(!preconditions_met(&ctx, &job).await.unwrap());

        ctx.registry
            .put_transcript(&media_id, Transcript::empty())
            .await
            .unwrap();
        assert!(!preconditions_met(&ctx, &job).await.unwrap());

        ctx.registry
            .put_silence_map(&media_id, SilenceMap::empty())
            .await
            .unwrap();
        assert!(preconditions_met(&ctx, &job).await.unwrap());
    }

    #[tokio::test]
    async fn index_scenes_waits_for_cuts_and_frames() {
        let ctx = test_context();
        let media_id = probed_media(&ctx).await;
        let job = Job::new(media_id.clone(), JobInput::IndexScenes);

        assert!(!preconditions_met(&ctx, &job).await.unwrap());
        ctx.registry
            .put_scene_cuts(&media_id, SceneCuts::empty())
            .await
            .unwrap();
        ctx.registry.put_frames(&media_id, vec![]).await.unwrap();
        assert!(preconditions_met(&ctx, &job).await.unwrap());
    }

    #[tokio::test]
    async fn enrichment_needs_a_probed_media() {
        let ctx = test_context();
        let media = Media::new("file:///v.mp4");
        let media_id = media.media_id.clone();
        ctx.registry.create_media(media).await.unwrap();

        let job = Job::new(media_id, JobInput::Transcribe);
        assert!(!preconditions_met(&ctx, &job).await.unwrap());
    }
}
