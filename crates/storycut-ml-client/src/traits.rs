//! Capability traits the pipeline depends on.

use async_trait::async_trait;

use storycut_models::{Frame, RawPlan, TokenUsage, Transcript};

use crate::error::MlResult;

/// Map extracted audio to a transcript.
///
/// Contract: every word satisfies `start < end`; segment boundaries are
/// monotonic non-decreasing; empty or silent audio yields an empty
/// transcript, not an error.
#[async_trait]
pub trait Transcribe: Send + Sync + 'static {
    async fn transcribe(&self, audio_wav: Vec<u8>) -> MlResult<Transcript>;
}

/// Map sampled frames to short natural-language descriptions.
#[async_trait]
pub trait DescribeFrames: Send + Sync + 'static {
    /// `frames` pairs each timestamp with JPEG bytes. The result preserves
    /// input order and timestamps.
    async fn describe_frames(&self, frames: &[(f64, Vec<u8>)]) -> MlResult<Vec<Frame>>;
}

/// Send a prepared prompt to the planning model and parse its strict-JSON
/// response. The caller validates; this trait never retries on its own.
#[async_trait]
pub trait GeneratePlan: Send + Sync + 'static {
    async fn generate_plan(&self, prompt: &str) -> MlResult<(RawPlan, TokenUsage)>;
}
