//! Shared test fixtures: memory backends and scripted model clients.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use storycut_blob::LocalBlobStore;
use storycut_ml_client::{DescribeFrames, GeneratePlan, MlError, MlResult, Transcribe};
use storycut_models::{Frame, Media, MediaId, MediaStatus, RawPlan, TechnicalMetadata, TokenUsage, Transcript};
use storycut_queue::MemoryQueue;
use storycut_registry::MemoryRegistry;

use crate::config::WorkerConfig;
use crate::context::ProcessingContext;

/// Transcriber returning a fixed transcript.
pub struct StaticTranscriber(pub Transcript);

#[async_trait]
impl Transcribe for StaticTranscriber {
    async fn transcribe(&self, audio_wav: Vec<u8>) -> MlResult<Transcript> {
        if audio_wav.is_empty() {
            return Ok(Transcript::empty());
        }
        Ok(self.0.clone())
    }
}

/// Describer that labels every frame with its timestamp.
pub struct EchoDescriber;

#[async_trait]
impl DescribeFrames for EchoDescriber {
    async fn describe_frames(&self, frames: &[(f64, Vec<u8>)]) -> MlResult<Vec<Frame>> {
        Ok(frames
            .iter()
            .map(|(t, _)| Frame {
                t: *t,
                description: format!("frame at {:.1}s", t),
                confidence: None,
            })
            .collect())
    }
}

/// Planner that replays a scripted sequence of responses.
pub struct ScriptedPlanner {
    responses: Mutex<VecDeque<MlResult<(RawPlan, TokenUsage)>>>,
}

impl ScriptedPlanner {
    pub fn new(responses: Vec<MlResult<(RawPlan, TokenUsage)>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn single_plan(raw: RawPlan) -> Self {
        Self::new(vec![Ok((raw, TokenUsage::default()))])
    }
}

#[async_trait]
impl GeneratePlan for ScriptedPlanner {
    async fn generate_plan(&self, _prompt: &str) -> MlResult<(RawPlan, TokenUsage)> {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(MlError::PlanParse("script exhausted".to_string())))
    }
}

/// Full context over memory backends with inert model clients.
pub fn test_context() -> ProcessingContext {
    test_context_with(
        Arc::new(StaticTranscriber(Transcript::empty())),
        Arc::new(ScriptedPlanner::new(vec![])),
    )
}

/// Context with caller-supplied transcriber and planner.
pub fn test_context_with(
    transcriber: Arc<dyn Transcribe>,
    plan_model: Arc<dyn GeneratePlan>,
) -> ProcessingContext {
    let scratch = std::env::temp_dir().join(format!("storycut-test-{}", uuid::Uuid::new_v4()));
    let blob = LocalBlobStore::new(scratch.join("blobs")).expect("blob root");

    let mut config = WorkerConfig::default();
    config.work_dir = scratch.join("work").to_string_lossy().to_string();
    config.precondition_retry_delay = std::time::Duration::from_millis(5);

    ProcessingContext {
        config,
        registry: Arc::new(MemoryRegistry::new()),
        blob: Arc::new(blob),
        queue: Arc::new(MemoryQueue::new()),
        transcriber,
        describer: Arc::new(EchoDescriber),
        plan_model,
    }
}

/// Insert a `Ready` media of the given duration and return its id.
pub async fn ready_media(ctx: &ProcessingContext, duration: f64, has_audio: bool) -> MediaId {
    let mut media = Media::new("file:///source.mp4");
    media.status = MediaStatus::Ready;
    media.technical = Some(TechnicalMetadata {
        duration,
        fps: 30.0,
        width: 1920,
        height: 1080,
        has_audio,
        video_codec: "h264".into(),
        audio_codec: if has_audio { "aac".into() } else { String::new() },
        bitrate: 0,
    });
    let id = media.media_id.clone();
    ctx.registry.create_media(media).await.unwrap();
    id
}
