//! ApplyPlan handler: execute a validated plan's EDL against the source,
//! one output per requested aspect ratio.
//!
//! Ratios render concurrently; segment extraction inside the job is
//! parallel up to the configured fan-out; concatenation per ratio is
//! serial. One failed ratio never cancels its siblings, and the parent job
//! completes only when every child render completed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use storycut_blob::keys;
use storycut_media::{extract, probe, subtitles};
use storycut_models::{
    AspectRatio, Job, JobError, JobId, JobInput, Plan, PlanStatus, Render, RenderStatus,
    TechnicalMetadata,
};
use storycut_registry::RenderPatch;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::probed_media;
use crate::retry::{retry_async, RetryConfig};

/// Segments whose gap is under this merge into one extraction.
const SEGMENT_JOIN_EPSILON_S: f64 = 0.010;

pub async fn apply_plan(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    let JobInput::ApplyPlan {
        plan_id,
        aspect_ratios,
        captions,
        normalise_audio,
    } = &job.input
    else {
        return Err(WorkerError::invalid_request("wrong input kind"));
    };
    if aspect_ratios.is_empty() {
        return Err(WorkerError::invalid_request("no aspect ratios requested"));
    }

    let plan = ctx
        .registry
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| WorkerError::invalid_request(format!("unknown plan {}", plan_id)))?;
    if matches!(plan.status, PlanStatus::Draft | PlanStatus::Rejected) {
        return Err(WorkerError::invalid_request(format!(
            "plan {} is not renderable (status {})",
            plan_id, plan.status
        )));
    }

    // Validated -> Rendering, or Rendered -> Rendering for a re-render.
    // A conflict means another apply job holds the plan already.
    for from in [PlanStatus::Validated, PlanStatus::Rendered] {
        match ctx
            .registry
            .update_plan_if_status(plan_id, from, PlanStatus::Rendering)
            .await
        {
            Ok(_) => break,
            Err(e) if e.is_conflict() => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let (media, technical) = probed_media(ctx, &plan.media_id).await?;

    let (to_render, reused) = ensure_render_records(ctx, &plan, aspect_ratios).await?;
    let reused_ids: Vec<String> = reused.iter().map(|r| r.render_id.to_string()).collect();

    if to_render.is_empty() {
        finish_plan(ctx, &plan, true).await;
        return Ok(Some(json!({"render_ids": [], "reused": reused_ids})));
    }

    // Shared keep windows: merge near-touching segments, drop sub-frame ones
    let keep_windows: Vec<(f64, f64)> = plan
        .keep_segments()
        .iter()
        .map(|s| (s.start, s.end))
        .collect();
    let keep_windows =
        extract::normalise_keep_windows(&keep_windows, technical.fps, SEGMENT_JOIN_EPSILON_S);
    if keep_windows.is_empty() {
        finish_plan(ctx, &plan, false).await;
        return Err(WorkerError::InvalidPlan(
            "every keep segment is shorter than one output frame".to_string(),
        ));
    }

    let work_dir = ctx.job_work_dir(&job.job_id);
    let segments = extract_segments(ctx, job, &media.source_uri, &keep_windows, &work_dir).await?;

    // Captions are timed to the output timeline; built once for all ratios
    let srt_path = if *captions {
        build_captions(ctx, &plan, &work_dir).await?
    } else {
        None
    };

    // Fan out one task per ratio
    let ctx = ctx.clone();
    let plan = Arc::new(plan);
    let technical = Arc::new(technical);
    let segments = Arc::new(segments);
    let mut tasks = Vec::with_capacity(to_render.len());
    for render in to_render {
        let ctx = ctx.clone();
        let plan = Arc::clone(&plan);
        let technical = Arc::clone(&technical);
        let segments = Arc::clone(&segments);
        let work_dir = work_dir.clone();
        let srt_path = srt_path.clone();
        let job_id = job.job_id.clone();
        let normalise_audio = *normalise_audio;

        tasks.push(tokio::spawn(async move {
            render_one_ratio(
                &ctx,
                &job_id,
                render,
                &plan,
                &technical,
                &segments,
                &work_dir,
                srt_path.as_deref(),
                normalise_audio,
            )
            .await
        }));
    }

    let mut completed_ids = Vec::new();
    let mut failures: Vec<(String, JobError)> = Vec::new();
    let mut cancelled = false;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(RatioOutcome::Completed(id)) => completed_ids.push(id.to_string()),
            Ok(RatioOutcome::Failed(id, error)) => failures.push((id.to_string(), error)),
            Ok(RatioOutcome::Cancelled) => cancelled = true,
            Err(join_err) => {
                return Err(WorkerError::job_failed(format!(
                    "render task panicked: {}",
                    join_err
                )))
            }
        }
    }

    if cancelled {
        finish_plan(&ctx, &plan, false).await;
        return Err(WorkerError::Cancelled);
    }
    if !failures.is_empty() {
        finish_plan(&ctx, &plan, false).await;
        let summary: Vec<String> = failures
            .iter()
            .map(|(id, e)| format!("{}: {}", id, e))
            .collect();
        return Err(WorkerError::job_failed(format!(
            "{} of {} renders failed: {}",
            failures.len(),
            failures.len() + completed_ids.len(),
            summary.join("; ")
        )));
    }

    finish_plan(&ctx, &plan, true).await;
    Ok(Some(json!({
        "render_ids": completed_ids,
        "reused": reused_ids,
    })))
}

/// Idempotency per `(plan_id, aspect_ratio)`: completed renders are reused,
/// anything else gets a fresh record. Failed records stay as history and
/// never block a new attempt.
pub(crate) async fn ensure_render_records(
    ctx: &ProcessingContext,
    plan: &Plan,
    aspect_ratios: &[AspectRatio],
) -> WorkerResult<(Vec<Render>, Vec<Render>)> {
    let existing = ctx.registry.list_renders_by_plan(&plan.plan_id).await?;

    let mut requested: Vec<AspectRatio> = Vec::with_capacity(aspect_ratios.len());
    for ratio in aspect_ratios {
        if !requested.contains(ratio) {
            requested.push(*ratio);
        }
    }

    let mut to_render = Vec::new();
    let mut reused = Vec::new();
    for ratio in requested {
        if let Some(done) = existing
            .iter()
            .find(|r| r.aspect_ratio == ratio && r.status == RenderStatus::Completed)
        {
            reused.push(done.clone());
            continue;
        }
        let render = Render::new(plan.media_id.clone(), plan.plan_id.clone(), ratio);
        ctx.registry.create_render(render.clone()).await?;
        to_render.push(render);
    }
    Ok((to_render, reused))
}

/// Extract every keep window into a uniform intermediate, in parallel up to
/// the configured fan-out. Cancellation is polled before each extraction;
/// a failed encode is retried once before failing the job.
async fn extract_segments(
    ctx: &ProcessingContext,
    job: &Job,
    source_uri: &str,
    keep_windows: &[(f64, f64)],
    work_dir: &Path,
) -> WorkerResult<Vec<PathBuf>> {
    let segments_dir = work_dir.join("segments");
    tokio::fs::create_dir_all(&segments_dir).await?;

    let permits = Arc::new(Semaphore::new(ctx.config.render_segment_parallelism.max(1)));
    let encoding = extract::SegmentEncoding::default();

    let mut tasks = Vec::with_capacity(keep_windows.len());
    for (index, &(start, end)) in keep_windows.iter().enumerate() {
        // Safe point: between segment extractions
        ctx.check_cancel(&job.job_id).await?;

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::job_failed("extraction pool closed"))?;
        let source_uri = source_uri.to_string();
        let output = segments_dir.join(format!("{}.mkv", index));
        let encoding = encoding.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let mut result =
                extract::extract_segment(&source_uri, start, end, &output, &encoding, None).await;
            if matches!(
                result,
                Err(storycut_media::MediaError::FfmpegFailed { .. })
            ) {
                // One retry per segment before the render fails
                result =
                    extract::extract_segment(&source_uri, start, end, &output, &encoding, None)
                        .await;
            }
            result.map(|_| output)
        }));
    }

    let mut paths = Vec::with_capacity(tasks.len());
    for task in tasks {
        let path = task
            .await
            .map_err(|e| WorkerError::job_failed(format!("extraction task panicked: {}", e)))??;
        paths.push(path);
    }

    // Intermediates also land under the job's blob scratch prefix so other
    // workers can inspect them; best effort only
    for (index, path) in paths.iter().enumerate() {
        let key = keys::tmp_segment_key(&job.job_id, index);
        if let Err(e) = ctx.blob.put_file(&key, path, "video/x-matroska").await {
            warn!(job_id = %job.job_id, error = %e, "segment scratch upload failed");
        }
    }

    Ok(paths)
}

/// Write the output-timeline SRT when a transcript exists and produces at
/// least one cue.
async fn build_captions(
    ctx: &ProcessingContext,
    plan: &Plan,
    work_dir: &Path,
) -> WorkerResult<Option<PathBuf>> {
    let Some(transcript) = ctx.registry.get_transcript(&plan.media_id).await? else {
        return Ok(None);
    };
    let srt = subtitles::build_output_srt(&transcript, plan);
    if srt.is_empty() {
        return Ok(None);
    }
    let path = work_dir.join("captions.srt");
    tokio::fs::write(&path, srt).await?;
    Ok(Some(path))
}

enum RatioOutcome {
    Completed(storycut_models::RenderId),
    Failed(storycut_models::RenderId, JobError),
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn render_one_ratio(
    ctx: &ProcessingContext,
    job_id: &JobId,
    render: Render,
    plan: &Plan,
    technical: &TechnicalMetadata,
    segments: &[PathBuf],
    work_dir: &Path,
    srt_path: Option<&Path>,
    normalise_audio: bool,
) -> RatioOutcome {
    let render_id = render.render_id.clone();

    if ctx
        .registry
        .update_render_if_status(
            &render_id,
            RenderStatus::Queued,
            RenderStatus::Running,
            RenderPatch::default(),
        )
        .await
        .is_err()
    {
        // Someone else owns this record; nothing to do here
        return RatioOutcome::Completed(render_id);
    }

    match run_ratio_pipeline(
        ctx,
        job_id,
        &render,
        plan,
        technical,
        segments,
        work_dir,
        srt_path,
        normalise_audio,
    )
    .await
    {
        Ok((output_uri, duration)) => {
            let patch = RenderPatch::completed(output_uri, duration);
            if let Err(e) = ctx
                .registry
                .update_render_if_status(
                    &render_id,
                    RenderStatus::Running,
                    RenderStatus::Completed,
                    patch,
                )
                .await
            {
                warn!(render_id = %render_id, error = %e, "completion write failed");
            }
            RatioOutcome::Completed(render_id)
        }
        Err(e) if e.is_cancelled() => {
            ctx.registry
                .update_render_if_status(
                    &render_id,
                    RenderStatus::Running,
                    RenderStatus::Cancelled,
                    RenderPatch::default(),
                )
                .await
                .ok();
            RatioOutcome::Cancelled
        }
        Err(e) => {
            let job_error = e.to_job_error();
            ctx.registry
                .update_render_if_status(
                    &render_id,
                    RenderStatus::Running,
                    RenderStatus::Failed,
                    RenderPatch::error(job_error.clone()),
                )
                .await
                .ok();
            RatioOutcome::Failed(render_id, job_error)
        }
    }
}

/// Adapt, concatenate and finish one ratio's output. Returns the blob URI
/// and the measured duration.
#[allow(clippy::too_many_arguments)]
async fn run_ratio_pipeline(
    ctx: &ProcessingContext,
    job_id: &JobId,
    render: &Render,
    plan: &Plan,
    technical: &TechnicalMetadata,
    segments: &[PathBuf],
    work_dir: &Path,
    srt_path: Option<&Path>,
    normalise_audio: bool,
) -> WorkerResult<(String, f64)> {
    let ratio = render.aspect_ratio;
    let frame = ratio.target_frame(ctx.config.render_reference_width);
    let ratio_dir = work_dir.join(ratio.file_stem());
    tokio::fs::create_dir_all(&ratio_dir).await?;

    // Fit-and-pad each segment into the target frame. The source ratio may
    // already match; the pass still runs so captions and audio apply the
    // same way for every ratio.
    let encoding = extract::SegmentEncoding::default();
    let mut adapted = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        // Safe point: between per-segment passes
        ctx.check_cancel(job_id).await?;
        let out = ratio_dir.join(format!("seg_{}.mkv", index));
        extract::apply_aspect(segment, &out, frame, &encoding).await?;
        adapted.push(out);
    }

    // Stream-concat in EDL order; no re-encode between segments
    let concat_path = ratio_dir.join("concat.mkv");
    let adapted_refs: Vec<&Path> = adapted.iter().map(|p| p.as_path()).collect();
    extract::concat_segments(&adapted_refs, &concat_path).await?;

    let mut current = concat_path;

    if let Some(srt) = srt_path {
        ctx.check_cancel(job_id).await?;
        let captioned = ratio_dir.join("captioned.mkv");
        extract::burn_subtitles(
            &current,
            srt,
            &captioned,
            &ctx.config.caption_font,
            ctx.config.caption_font_size,
            &encoding,
        )
        .await?;
        current = captioned;
    }

    if normalise_audio && technical.has_audio {
        ctx.check_cancel(job_id).await?;
        let normed = ratio_dir.join("normed.mkv");
        extract::normalise_audio(&current, &normed, ctx.config.render_loudness_target_lufs)
            .await?;
        current = normed;
    }

    let final_path = ratio_dir.join("final.mp4");
    extract::finalise(&current, &final_path).await?;

    let duration = probe::measure_duration(&final_path.to_string_lossy())
        .await
        .unwrap_or_else(|_| plan.total_keep());

    // Thumbnail beside the output; failures are logged, not fatal
    let thumb_path = ratio_dir.join("thumb.jpg");
    match extract::thumbnail(&final_path, &thumb_path, 480).await {
        Ok(()) => {
            let thumb_key = keys::render_thumbnail_key(&plan.plan_id, ratio);
            if let Err(e) = ctx.blob.put_file(&thumb_key, &thumb_path, "image/jpeg").await {
                warn!(render_id = %render.render_id, error = %e, "thumbnail upload failed");
            }
        }
        Err(e) => warn!(render_id = %render.render_id, error = %e, "thumbnail generation failed"),
    }

    // A transient blob-store hiccup should not waste a finished encode
    let key = keys::render_key(&plan.plan_id, ratio);
    retry_async(&RetryConfig::new("render_upload"), || {
        ctx.blob.put_file(&key, &final_path, "video/mp4")
    })
    .await?;

    info!(
        render_id = %render.render_id,
        ratio = %ratio,
        duration = duration,
        "render completed"
    );

    Ok((ctx.blob.url_for(&key), duration))
}

/// Move the plan out of `Rendering`: forward to `Rendered` on success,
/// back to `Validated` otherwise. Both directions are best effort; a
/// conflict just means another apply job already moved it.
async fn finish_plan(ctx: &ProcessingContext, plan: &Plan, success: bool) {
    let to = if success {
        PlanStatus::Rendered
    } else {
        PlanStatus::Validated
    };
    ctx.registry
        .update_plan_if_status(&plan.plan_id, PlanStatus::Rendering, to)
        .await
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ready_media, test_context};
    use storycut_models::{EdlSegment, MediaId, PlanMode};

    async fn stored_plan(ctx: &ProcessingContext, media_id: &MediaId) -> Plan {
        let mut plan = Plan::new(media_id.clone(), PlanMode::Heuristic, 0.3);
        plan.status = PlanStatus::Validated;
        plan.edl = vec![
            EdlSegment::keep(2.0, 12.0),
            EdlSegment::keep(20.0, 30.0),
            EdlSegment::keep(40.0, 50.0),
        ];
        ctx.registry.create_plan(plan.clone()).await.unwrap();
        plan
    }

    #[tokio::test]
    async fn render_records_are_keyed_by_plan_and_ratio() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 100.0, true).await;
        let plan = stored_plan(&ctx, &media_id).await;

        let ratios = vec![
            AspectRatio::LANDSCAPE,
            AspectRatio::PORTRAIT,
            AspectRatio::SQUARE,
        ];
        let (to_render, reused) = ensure_render_records(&ctx, &plan, &ratios).await.unwrap();
        assert_eq!(to_render.len(), 3);
        assert!(reused.is_empty());
    }

    #[tokio::test]
    async fn completed_render_is_reused_failed_one_is_not() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 100.0, true).await;
        let plan = stored_plan(&ctx, &media_id).await;

        // One ratio completed, one failed
        let (records, _) = ensure_render_records(
            &ctx,
            &plan,
            &[AspectRatio::LANDSCAPE, AspectRatio::SQUARE],
        )
        .await
        .unwrap();
        for record in &records {
            ctx.registry
                .update_render_if_status(
                    &record.render_id,
                    RenderStatus::Queued,
                    RenderStatus::Running,
                    RenderPatch::default(),
                )
                .await
                .unwrap();
        }
        ctx.registry
            .update_render_if_status(
                &records[0].render_id,
                RenderStatus::Running,
                RenderStatus::Completed,
                RenderPatch::completed("file:///out.mp4", 30.0),
            )
            .await
            .unwrap();
        ctx.registry
            .update_render_if_status(
                &records[1].render_id,
                RenderStatus::Running,
                RenderStatus::Failed,
                RenderPatch::error(JobError::new(
                    storycut_models::ErrorCode::EncodeError,
                    "encoder blew up",
                )),
            )
            .await
            .unwrap();

        // Re-request both: the completed one is reused, the failed ratio
        // gets a fresh record and the failed record stays as history
        let (to_render, reused) = ensure_render_records(
            &ctx,
            &plan,
            &[AspectRatio::LANDSCAPE, AspectRatio::SQUARE],
        )
        .await
        .unwrap();
        assert_eq!(reused.len(), 1);
        assert_eq!(reused[0].aspect_ratio, AspectRatio::LANDSCAPE);
        assert_eq!(to_render.len(), 1);
        assert_eq!(to_render[0].aspect_ratio, AspectRatio::SQUARE);

        let all = ctx.registry.list_renders_by_plan(&plan.plan_id).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn apply_plan_rejects_unrenderable_plans() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 100.0, true).await;
        let mut plan = Plan::new(media_id.clone(), PlanMode::Story, 0.3);
        plan.status = PlanStatus::Rejected;
        ctx.registry.create_plan(plan.clone()).await.unwrap();

        let job = Job::new(
            media_id,
            JobInput::ApplyPlan {
                plan_id: plan.plan_id.clone(),
                aspect_ratios: vec![AspectRatio::PORTRAIT],
                captions: false,
                normalise_audio: false,
            },
        );
        let err = apply_plan(&ctx, &job).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidRequest(_)));
    }
}
