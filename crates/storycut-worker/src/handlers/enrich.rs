//! Enrichment handlers: transcript, silence map, scene cuts, frame
//! descriptions, scene index and clip candidates.

use serde_json::{json, Value};
use tracing::{info, warn};

use storycut_blob::keys;
use storycut_media::{audio, frames as frame_sampling, scenecut, silence};
use storycut_models::{Job, SilenceInterval, SilenceMap, Transcript};
use storycut_planner::{index_scenes as build_scene_index, select_clips as run_selector, SelectorConfig};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::probed_media;
use crate::retry::{retry_async, RetryConfig};

/// Transcribe the media's audio track.
pub async fn transcribe(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_transcript(&job.media_id).await? {
        return Ok(Some(json!({"segments": existing.segments.len(), "cached": true})));
    }

    let (media, technical) = probed_media(ctx, &job.media_id).await?;

    // Silent or empty sources complete with an empty transcript
    if technical.duration <= 0.0 || !technical.has_audio {
        ctx.registry
            .put_transcript(&job.media_id, Transcript::empty())
            .await?;
        return Ok(Some(json!({"segments": 0})));
    }

    let audio_bytes = fetch_or_extract_audio(ctx, job, &media.source_uri).await?;
    let raw = ctx.transcriber.transcribe(audio_bytes).await?;
    let transcript = clamp_transcript(raw, technical.duration);

    if let Err(reason) = transcript.check_invariants(technical.duration) {
        return Err(WorkerError::job_failed(format!(
            "transcriber broke its contract: {}",
            reason
        )));
    }

    let count = transcript.segments.len();
    ctx.registry.put_transcript(&job.media_id, transcript).await?;
    info!(media_id = %job.media_id, segments = count, "transcript stored");
    Ok(Some(json!({"segments": count})))
}

/// Reuse the derived audio artefact when present, otherwise extract and
/// store it. Re-extraction always lands on the same key, so retried
/// attempts converge.
async fn fetch_or_extract_audio(
    ctx: &ProcessingContext,
    job: &Job,
    source_uri: &str,
) -> WorkerResult<Vec<u8>> {
    let key = keys::audio_key(&job.media_id);
    if ctx.blob.exists(&key).await? {
        return Ok(ctx.blob.get_bytes(&key).await?);
    }

    let work_dir = ctx.job_work_dir(&job.job_id);
    tokio::fs::create_dir_all(&work_dir).await?;
    let wav_path = work_dir.join("audio.wav");

    audio::extract_audio(source_uri, &wav_path).await?;
    retry_async(&RetryConfig::new("audio_upload"), || {
        ctx.blob.put_file(&key, &wav_path, "audio/wav")
    })
    .await?;
    Ok(tokio::fs::read(&wav_path).await?)
}

/// Drop or clamp transcript segments that leak past the source duration.
fn clamp_transcript(mut transcript: Transcript, duration: f64) -> Transcript {
    transcript.segments.retain(|s| s.start < duration);
    for seg in &mut transcript.segments {
        if seg.end > duration {
            seg.end = duration;
            seg.words.retain(|w| w.start < duration);
            for word in &mut seg.words {
                word.end = word.end.min(duration);
            }
        }
    }
    transcript.segments.retain(|s| s.end > s.start);
    transcript
}

/// Detect silence intervals in the media's audio track.
pub async fn detect_silence(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_silence_map(&job.media_id).await? {
        return Ok(Some(json!({"intervals": existing.intervals.len(), "cached": true})));
    }

    let (media, technical) = probed_media(ctx, &job.media_id).await?;

    let map = if technical.duration <= 0.0 {
        SilenceMap {
            intervals: Vec::new(),
            min_silence_s: ctx.config.min_silence_s,
        }
    } else if !technical.has_audio {
        // No audio track: the whole timeline is silent
        SilenceMap {
            intervals: vec![SilenceInterval {
                start: 0.0,
                end: technical.duration,
            }],
            min_silence_s: ctx.config.min_silence_s,
        }
    } else {
        let work_dir = ctx.job_work_dir(&job.job_id);
        tokio::fs::create_dir_all(&work_dir).await?;
        let pcm_path = work_dir.join("audio.f32");

        audio::extract_pcm_f32(&media.source_uri, &pcm_path).await?;
        let samples = audio::load_samples_f32(&pcm_path).await?;
        silence::scan_samples(
            &samples,
            &silence::SilenceConfig {
                min_silence_s: ctx.config.min_silence_s,
                energy_threshold: ctx.config.silence_energy_threshold,
                frame_ms: 30,
            },
        )
    };

    let count = map.intervals.len();
    ctx.registry.put_silence_map(&job.media_id, map).await?;
    info!(media_id = %job.media_id, intervals = count, "silence map stored");
    Ok(Some(json!({"intervals": count})))
}

/// Detect scene cuts.
pub async fn detect_scenes(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_scene_cuts(&job.media_id).await? {
        return Ok(Some(json!({"cuts": existing.cuts.len(), "cached": true})));
    }

    let (media, technical) = probed_media(ctx, &job.media_id).await?;

    let cuts = if technical.duration <= 0.0 {
        storycut_models::SceneCuts::empty()
    } else {
        scenecut::detect_scene_cuts(
            &media.source_uri,
            ctx.config.scene_threshold,
            technical.duration,
        )
        .await?
    };

    let count = cuts.cuts.len();
    ctx.registry.put_scene_cuts(&job.media_id, cuts).await?;
    Ok(Some(json!({"cuts": count})))
}

/// Sample frames and describe them with the vision model.
pub async fn describe_frames(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_frames(&job.media_id).await? {
        return Ok(Some(json!({"frames": existing.len(), "cached": true})));
    }

    let (media, technical) = probed_media(ctx, &job.media_id).await?;

    if technical.duration <= 0.0 {
        ctx.registry.put_frames(&job.media_id, Vec::new()).await?;
        return Ok(Some(json!({"frames": 0})));
    }

    let work_dir = ctx.job_work_dir(&job.job_id).join("frames");
    let sampled =
        frame_sampling::sample_frames(&media.source_uri, ctx.config.frame_sample_s, &work_dir)
            .await?;

    let mut described = Vec::with_capacity(sampled.len());
    for batch in sampled.chunks(ctx.config.frame_batch_size.max(1)) {
        // Safe point: between frame batches
        ctx.check_cancel(&job.job_id).await?;

        let mut payload = Vec::with_capacity(batch.len());
        for (t, path) in batch {
            payload.push((*t, tokio::fs::read(path).await?));
        }
        described.extend(ctx.describer.describe_frames(&payload).await?);

        // The sampled JPEGs are kept as derived artefacts; best effort
        for (t, path) in batch {
            let key = keys::frame_key(&job.media_id, *t);
            if let Err(e) = ctx.blob.put_file(&key, path, "image/jpeg").await {
                warn!(media_id = %job.media_id, t = t, error = %e, "frame upload failed");
            }
        }
    }

    let count = described.len();
    ctx.registry.put_frames(&job.media_id, described).await?;
    info!(media_id = %job.media_id, frames = count, "frame descriptions stored");
    Ok(Some(json!({"frames": count})))
}

/// Merge scene cuts and frame descriptions into labeled scenes.
pub async fn index_scenes(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_scenes(&job.media_id).await? {
        return Ok(Some(json!({"scenes": existing.len(), "cached": true})));
    }

    let (_, technical) = probed_media(ctx, &job.media_id).await?;
    let cuts = ctx
        .registry
        .get_scene_cuts(&job.media_id)
        .await?
        .ok_or_else(|| WorkerError::invalid_request("scene cuts not available"))?;
    let frames = ctx
        .registry
        .get_frames(&job.media_id)
        .await?
        .ok_or_else(|| WorkerError::invalid_request("frames not available"))?;

    let scenes = build_scene_index(&cuts, &frames, technical.duration);
    let count = scenes.len();
    ctx.registry.put_scenes(&job.media_id, scenes).await?;
    Ok(Some(json!({"scenes": count})))
}

/// Score and select clip candidates.
pub async fn select_clips(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Option<Value>> {
    if let Some(existing) = ctx.registry.get_clip_candidates(&job.media_id).await? {
        return Ok(Some(json!({"candidates": existing.len(), "cached": true})));
    }

    let (_, technical) = probed_media(ctx, &job.media_id).await?;
    let transcript = ctx.registry.get_transcript(&job.media_id).await?;
    let silence_map = ctx.registry.get_silence_map(&job.media_id).await?;
    let cuts = ctx.registry.get_scene_cuts(&job.media_id).await?;

    let config = SelectorConfig {
        min_clip_s: ctx.config.clip_min_s,
        max_clip_s: ctx.config.clip_max_s,
        max_candidates: ctx.config.clip_n,
        ..SelectorConfig::default()
    };

    let candidates = run_selector(
        &job.media_id,
        transcript.as_ref(),
        silence_map.as_ref(),
        cuts.as_ref(),
        technical.duration,
        &config,
    );

    let count = candidates.len();
    ctx.registry
        .put_clip_candidates(&job.media_id, candidates)
        .await?;
    info!(media_id = %job.media_id, candidates = count, "clip candidates stored");
    Ok(Some(json!({"candidates": count})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ready_media, test_context};
    use storycut_models::{JobInput, TranscriptSegment};

    #[tokio::test]
    async fn transcribe_without_audio_stores_empty_transcript() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 30.0, false).await;
        let job = Job::new(media_id.clone(), JobInput::Transcribe);

        transcribe(&ctx, &job).await.unwrap();
        let transcript = ctx.registry.get_transcript(&media_id).await.unwrap().unwrap();
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn transcribe_is_idempotent() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 30.0, false).await;
        let job = Job::new(media_id.clone(), JobInput::Transcribe);

        transcribe(&ctx, &job).await.unwrap();
        let first = ctx.registry.get_transcript(&media_id).await.unwrap().unwrap();

        // Second run with a retry job leaves state byte-identical
        let retry = Job::new(media_id.clone(), JobInput::Transcribe);
        let result = transcribe(&ctx, &retry).await.unwrap().unwrap();
        assert_eq!(result["cached"], true);
        let second = ctx.registry.get_transcript(&media_id).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn silence_on_muted_source_is_one_full_interval() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 30.0, false).await;
        let job = Job::new(media_id.clone(), JobInput::DetectSilence);

        detect_silence(&ctx, &job).await.unwrap();
        let map = ctx.registry.get_silence_map(&media_id).await.unwrap().unwrap();
        assert_eq!(map.intervals.len(), 1);
        assert_eq!(map.intervals[0].start, 0.0);
        assert_eq!(map.intervals[0].end, 30.0);
    }

    #[tokio::test]
    async fn zero_duration_source_gets_empty_artefacts() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 0.0, true).await;

        let job = Job::new(media_id.clone(), JobInput::Transcribe);
        transcribe(&ctx, &job).await.unwrap();
        assert!(ctx
            .registry
            .get_transcript(&media_id)
            .await
            .unwrap()
            .unwrap()
            .is_empty());

        let job = Job::new(media_id.clone(), JobInput::DetectSilence);
        detect_silence(&ctx, &job).await.unwrap();
        assert!(ctx
            .registry
            .get_silence_map(&media_id)
            .await
            .unwrap()
            .unwrap()
            .intervals
            .is_empty());

        let job = Job::new(media_id.clone(), JobInput::DetectScenes);
        detect_scenes(&ctx, &job).await.unwrap();
        assert!(ctx
            .registry
            .get_scene_cuts(&media_id)
            .await
            .unwrap()
            .unwrap()
            .cuts
            .is_empty());
    }

    #[tokio::test]
    async fn index_scenes_builds_covering_intervals() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 20.0, true).await;
        ctx.registry
            .put_scene_cuts(&media_id, storycut_models::SceneCuts { cuts: vec![10.0] })
            .await
            .unwrap();
        ctx.registry
            .put_frames(
                &media_id,
                vec![storycut_models::Frame {
                    t: 12.0,
                    description: "a whiteboard".into(),
                    confidence: None,
                }],
            )
            .await
            .unwrap();

        let job = Job::new(media_id.clone(), JobInput::IndexScenes);
        index_scenes(&ctx, &job).await.unwrap();

        let scenes = ctx.registry.get_scenes(&media_id).await.unwrap().unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[1].description.as_deref(), Some("a whiteboard"));
    }

    #[tokio::test]
    async fn select_clips_with_no_transcript_is_empty_not_failed() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 120.0, true).await;
        // Transcript and silence exist but carry no segments
        ctx.registry
            .put_transcript(&media_id, Transcript::empty())
            .await
            .unwrap();
        ctx.registry
            .put_silence_map(&media_id, SilenceMap::empty())
            .await
            .unwrap();

        let job = Job::new(media_id.clone(), JobInput::SelectClips);
        let result = select_clips(&ctx, &job).await.unwrap().unwrap();
        assert_eq!(result["candidates"], 0);
    }

    #[tokio::test]
    async fn select_clips_finds_candidates_in_dense_speech() {
        let ctx = test_context();
        let media_id = ready_media(&ctx, 120.0, true).await;

        let segments: Vec<TranscriptSegment> = (0..24)
            .map(|i| TranscriptSegment {
                start: i as f64 * 5.0,
                end: (i + 1) as f64 * 5.0,
                text: "a steady stream of words to keep the density up".into(),
                confidence: None,
                words: vec![],
            })
            .collect();
        ctx.registry
            .put_transcript(
                &media_id,
                Transcript {
                    segments,
                    language: "en".into(),
                },
            )
            .await
            .unwrap();
        ctx.registry
            .put_silence_map(&media_id, SilenceMap::empty())
            .await
            .unwrap();

        let job = Job::new(media_id.clone(), JobInput::SelectClips);
        select_clips(&ctx, &job).await.unwrap();

        let candidates = ctx
            .registry
            .get_clip_candidates(&media_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 5);
    }

    #[test]
    fn clamp_drops_and_trims_overrunning_segments() {
        let transcript = Transcript {
            segments: vec![
                TranscriptSegment {
                    start: 0.0,
                    end: 5.0,
                    text: "fine".into(),
                    confidence: None,
                    words: vec![],
                },
                TranscriptSegment {
                    start: 8.0,
                    end: 15.0,
                    text: "trimmed".into(),
                    confidence: None,
                    words: vec![],
                },
                TranscriptSegment {
                    start: 20.0,
                    end: 25.0,
                    text: "dropped".into(),
                    confidence: None,
                    words: vec![],
                },
            ],
            language: "en".into(),
        };
        let clamped = clamp_transcript(transcript, 10.0);
        assert_eq!(clamped.segments.len(), 2);
        assert_eq!(clamped.segments[1].end, 10.0);
        assert!(clamped.check_invariants(10.0).is_ok());
    }
}
