//! Plan generation handlers: heuristic and story-driven.

use serde_json::{json, Value};
use tracing::info;

use storycut_models::{Job, JobInput, PlanMode, RawPlan};
use storycut_planner::{build_prompt, compress, validate_raw, CompressorConfig, ValidatorConfig};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::probed_media;

/// Heuristic plan: one keep window, from a stored clip candidate or a
/// caller-supplied free-form window.
pub async fn heuristic(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    let JobInput::PlanHeuristic {
        candidate_index,
        window,
    } = &job.input
    else {
        return Err(WorkerError::invalid_request("wrong input kind"));
    };

    let (_, technical) = probed_media(ctx, &job.media_id).await?;
    let duration = technical.duration;
    if duration <= 0.0 {
        return Err(WorkerError::EmptySource(format!(
            "media {} has no timeline",
            job.media_id
        )));
    }

    let (start, end) = match window {
        Some((start, end)) => (*start, *end),
        None => {
            let candidates = ctx
                .registry
                .get_clip_candidates(&job.media_id)
                .await?
                .unwrap_or_default();
            let index = candidate_index.unwrap_or(0);
            let candidate = candidates.get(index).ok_or_else(|| {
                WorkerError::invalid_request(format!(
                    "no clip candidate at index {} ({} available)",
                    index,
                    candidates.len()
                ))
            })?;
            (candidate.start, candidate.end)
        }
    };

    let start = start.clamp(0.0, duration);
    let end = end.clamp(0.0, duration);
    if end <= start {
        return Err(WorkerError::invalid_request(format!(
            "degenerate window [{}, {}]",
            start, end
        )));
    }

    let desired_length_pct = (end - start) / duration;
    let raw = RawPlan::from_keep_windows(&[(start, end)]);
    let plan = validate_raw(
        &raw,
        &job.media_id,
        PlanMode::Heuristic,
        duration,
        desired_length_pct,
        false,
        &validator_config(ctx),
    )?;

    let plan_id = plan.plan_id.clone();
    let total_keep = plan.total_keep();
    ctx.registry.create_plan(plan).await?;

    info!(media_id = %job.media_id, plan_id = %plan_id, total_keep = total_keep, "heuristic plan stored");
    Ok(Some(json!({"plan_id": plan_id, "total_keep_s": total_keep})))
}

/// Story plan: compress enrichment, prompt the model, validate its EDL.
pub async fn story(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    let JobInput::PlanStory { brief } = &job.input else {
        return Err(WorkerError::invalid_request("wrong input kind"));
    };
    if !(brief.desired_length_pct > 0.0 && brief.desired_length_pct <= 1.0) {
        return Err(WorkerError::invalid_request(
            "desired_length_pct must be in (0, 1]",
        ));
    }

    let (_, technical) = probed_media(ctx, &job.media_id).await?;
    let duration = technical.duration;
    if duration <= 0.0 {
        return Err(WorkerError::EmptySource(format!(
            "media {} has no timeline",
            job.media_id
        )));
    }

    let transcript = ctx.registry.get_transcript(&job.media_id).await?;
    let scenes = ctx
        .registry
        .get_scenes(&job.media_id)
        .await?
        .unwrap_or_default();
    let frames = ctx
        .registry
        .get_frames(&job.media_id)
        .await?
        .unwrap_or_default();
    let segments = transcript.map(|t| t.segments).unwrap_or_default();

    // A plan needs something to work from: speech, scenes or frames
    if segments.is_empty() && scenes.is_empty() && frames.is_empty() {
        return Err(WorkerError::InvalidPlan(
            "insufficient signal: no transcript, scenes or frames".to_string(),
        ));
    }

    // Clip candidate starts act as key-moment hints for frame retention
    let hints: Vec<f64> = ctx
        .registry
        .get_clip_candidates(&job.media_id)
        .await?
        .unwrap_or_default()
        .iter()
        .map(|c| c.start)
        .collect();

    let compressed = compress(
        &frames,
        &scenes,
        &segments,
        duration,
        &hints,
        &CompressorConfig {
            frame_cap: ctx.config.compress_frame_cap,
            scene_cap: ctx.config.compress_scene_cap,
            segment_cap: ctx.config.compress_segment_cap,
            ..CompressorConfig::default()
        },
    );

    let prompt = build_prompt(
        &compressed,
        brief,
        duration,
        ctx.config.plan_coverage_tolerance_pct,
    );

    // The model call is not retried here; the supervisor owns retry
    let (raw, usage) = ctx.plan_model.generate_plan(&prompt).await?;

    let plan = validate_raw(
        &raw,
        &job.media_id,
        PlanMode::Story,
        duration,
        brief.desired_length_pct,
        brief.strict_coverage,
        &validator_config(ctx),
    )?;

    let plan_id = plan.plan_id.clone();
    let warnings: Vec<String> = plan.warnings.iter().map(|w| w.code.clone()).collect();
    let total_keep = plan.total_keep();
    ctx.registry.create_plan(plan).await?;

    info!(
        media_id = %job.media_id,
        plan_id = %plan_id,
        total_keep = total_keep,
        warnings = warnings.len(),
        "story plan stored"
    );

    Ok(Some(json!({
        "plan_id": plan_id,
        "total_keep_s": total_keep,
        "warnings": warnings,
        "token_usage": usage,
    })))
}

fn validator_config(ctx: &ProcessingContext) -> ValidatorConfig {
    ValidatorConfig {
        coverage_tolerance_pct: ctx.config.plan_coverage_tolerance_pct,
        ..ValidatorConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ready_media, test_context, test_context_with, ScriptedPlanner, StaticTranscriber};
    use std::sync::Arc;
    use storycut_models::{
        ErrorCode, PlanId, PlanStatus, Scene, StoryArc, StoryBrief, Transcript,
    };

    fn plan_id_of(result: &Value) -> PlanId {
        PlanId::from_string(result["plan_id"].as_str().unwrap())
    }

    #[tokio::test]
    async fn heuristic_plan_from_free_window() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 100.0, true).await;
        let job = Job::new(
            media_id.clone(),
            JobInput::PlanHeuristic {
                candidate_index: None,
                window: Some((10.0, 40.0)),
            },
        );

        let result = heuristic(&ctx, &job).await.unwrap().unwrap();
        let plan = ctx
            .registry
            .get_plan(&plan_id_of(&result))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Validated);
        assert!((plan.total_keep() - 30.0).abs() < 1e-9);
        // Exact-window plans have no coverage warning by construction
        assert!(plan.warnings.iter().all(|w| w.code != "coverage"));
    }

    #[tokio::test]
    async fn heuristic_plan_on_empty_source_is_an_input_error() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 0.0, false).await;
        let job = Job::new(
            media_id,
            JobInput::PlanHeuristic {
                candidate_index: None,
                window: Some((0.0, 10.0)),
            },
        );

        let err = heuristic(&ctx, &job).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::EmptySource);
        assert!(!err.error_code().is_retryable());
    }

    #[tokio::test]
    async fn story_plan_happy_path_records_usage_and_warnings() {
        let raw = RawPlan {
            story_arc: Some(StoryArc {
                hook_t: 2.0,
                climax_t: 25.0,
                resolution_t: 45.0,
            }),
            ..RawPlan::from_keep_windows(&[(0.0, 10.0), (20.0, 30.0), (40.0, 50.0)])
        };
        let ctx = test_context_with(
            Arc::new(StaticTranscriber(Transcript::empty())),
            Arc::new(ScriptedPlanner::single_plan(raw)),
        );
        let media_id = ready_media(&ctx, 100.0, true).await;
        ctx.registry
            .put_scenes(
                &media_id,
                vec![Scene {
                    start: 0.0,
                    end: 100.0,
                    description: Some("one scene".into()),
                }],
            )
            .await
            .unwrap();

        let job = Job::new(
            media_id.clone(),
            JobInput::PlanStory {
                brief: StoryBrief::new("tell the story of the demo", 0.3),
            },
        );
        let result = story(&ctx, &job).await.unwrap().unwrap();

        let plan = ctx
            .registry
            .get_plan(&plan_id_of(&result))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Validated);
        assert_eq!(plan.keep_segments().len(), 3);
        assert!(result.get("token_usage").is_some());
    }

    #[tokio::test]
    async fn story_plan_without_any_signal_is_invalid_plan() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 30.0, false).await;
        // Empty transcript present, no scenes, no frames
        ctx.registry
            .put_transcript(&media_id, Transcript::empty())
            .await
            .unwrap();

        let job = Job::new(
            media_id,
            JobInput::PlanStory {
                brief: StoryBrief::new("anything", 0.5),
            },
        );
        let err = story(&ctx, &job).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidPlan);
    }

    #[tokio::test]
    async fn story_plan_with_empty_edl_is_rejected() {
        let ctx = test_context_with(
            Arc::new(StaticTranscriber(Transcript::empty())),
            Arc::new(ScriptedPlanner::single_plan(RawPlan::default())),
        );
        let media_id = ready_media(&ctx, 100.0, true).await;
        ctx.registry
            .put_scenes(
                &media_id,
                vec![Scene {
                    start: 0.0,
                    end: 100.0,
                    description: None,
                }],
            )
            .await
            .unwrap();

        let job = Job::new(
            media_id,
            JobInput::PlanStory {
                brief: StoryBrief::new("anything", 0.5),
            },
        );
        let err = story(&ctx, &job).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidPlan);
    }
}
