//! Shared data models for the Storycut backend.
//!
//! This crate provides Serde-serializable types for:
//! - Media records and probed technical metadata
//! - Jobs, job inputs and the job state lattice
//! - Enrichment artefacts (transcript, silence map, scene cuts, frames,
//!   scenes, clip candidates)
//! - Plans, EDLs and the planner JSON contract
//! - Renders and aspect ratios
//! - Timestamp formatting for FFmpeg and SRT output

pub mod enrichment;
pub mod ids;
pub mod job;
pub mod media;
pub mod plan;
pub mod render;
pub mod story;
pub mod timestamp;

pub use enrichment::{
    ClipCandidate, ClipFeatures, Frame, Scene, SceneCuts, SilenceInterval, SilenceMap, Transcript,
    TranscriptSegment, Word,
};
pub use ids::{JobId, MediaId, PlanId, RenderId};
pub use job::{ErrorCode, Job, JobError, JobInput, JobKind, JobStatus};
pub use media::{Media, MediaStatus, TechnicalMetadata};
pub use plan::{
    EdlSegment, KeyMoment, Plan, PlanMode, PlanStatus, PlanWarning, RawPlan, RawSegment,
    Recommendation, SegmentKind, StoryArc, TokenUsage, Transition,
};
pub use render::{AspectRatio, AspectRatioParseError, Render, RenderStatus};
pub use story::StoryBrief;
pub use timestamp::{format_timestamp, format_timestamp_srt, parse_timestamp, TimestampError};
