//! Job records and the job state lattice.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{JobId, MediaId, PlanId};
use crate::render::AspectRatio;
use crate::story::StoryBrief;

/// Kind of asynchronous work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Probe,
    Transcribe,
    DetectSilence,
    DetectScenes,
    DescribeFrames,
    IndexScenes,
    SelectClips,
    PlanHeuristic,
    PlanStory,
    ApplyPlan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Probe => "probe",
            JobKind::Transcribe => "transcribe",
            JobKind::DetectSilence => "detect_silence",
            JobKind::DetectScenes => "detect_scenes",
            JobKind::DescribeFrames => "describe_frames",
            JobKind::IndexScenes => "index_scenes",
            JobKind::SelectClips => "select_clips",
            JobKind::PlanHeuristic => "plan_heuristic",
            JobKind::PlanStory => "plan_story",
            JobKind::ApplyPlan => "apply_plan",
        }
    }

    /// Enrichment kinds a caller may request through the enrich endpoint.
    pub fn is_enrichment(&self) -> bool {
        matches!(
            self,
            JobKind::Transcribe
                | JobKind::DetectSilence
                | JobKind::DetectScenes
                | JobKind::DescribeFrames
                | JobKind::IndexScenes
                | JobKind::SelectClips
        )
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job status. Transitions are monotonic:
/// `Queued -> Running -> {Completed, Failed, Cancelled}` with
/// `Queued -> Cancelled` as the only other edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal edge in the state lattice.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable error codes surfaced in `Job.error` and `Render.error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors: never retried
    SourceUnreachable,
    UnrecognisedFormat,
    InvalidRequest,
    EmptySource,
    // Transient errors: retried per policy
    ExternalModelTimeout,
    ExternalModelRateLimited,
    BlobStoreUnavailable,
    EncodeError,
    // Contract errors
    InvalidPlan,
    // Fatal errors: no retry
    DecodeError,
    OutputWriteError,
    CorruptIntermediate,
    // Misc
    NoAudioTrack,
    Cancelled,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    /// Whether the retry supervisor may enqueue a successor attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ExternalModelTimeout
                | ErrorCode::ExternalModelRateLimited
                | ErrorCode::BlobStoreUnavailable
                | ErrorCode::EncodeError
                | ErrorCode::DeadlineExceeded
                | ErrorCode::Internal
        )
    }
}

/// Structured error stored on a terminal job or render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Kind-specific job input. Inputs are deterministic functions of registry
/// state so that a superseding attempt is equivalent to the original.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobInput {
    Probe,
    Transcribe,
    DetectSilence,
    DetectScenes,
    DescribeFrames,
    IndexScenes,
    SelectClips,
    PlanHeuristic {
        /// Index into the stored clip candidates, when planning from one
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate_index: Option<usize>,
        /// Free-form window (start, end) in seconds
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<(f64, f64)>,
    },
    PlanStory {
        brief: StoryBrief,
    },
    ApplyPlan {
        plan_id: PlanId,
        aspect_ratios: Vec<AspectRatio>,
        #[serde(default)]
        captions: bool,
        #[serde(default)]
        normalise_audio: bool,
    },
}

impl JobInput {
    /// The job kind this input drives.
    pub fn kind(&self) -> JobKind {
        match self {
            JobInput::Probe => JobKind::Probe,
            JobInput::Transcribe => JobKind::Transcribe,
            JobInput::DetectSilence => JobKind::DetectSilence,
            JobInput::DetectScenes => JobKind::DetectScenes,
            JobInput::DescribeFrames => JobKind::DescribeFrames,
            JobInput::IndexScenes => JobKind::IndexScenes,
            JobInput::SelectClips => JobKind::SelectClips,
            JobInput::PlanHeuristic { .. } => JobKind::PlanHeuristic,
            JobInput::PlanStory { .. } => JobKind::PlanStory,
            JobInput::ApplyPlan { .. } => JobKind::ApplyPlan,
        }
    }

    /// Bare input for a plain enrichment kind.
    pub fn for_enrichment(kind: JobKind) -> Option<Self> {
        match kind {
            JobKind::Transcribe => Some(JobInput::Transcribe),
            JobKind::DetectSilence => Some(JobInput::DetectSilence),
            JobKind::DetectScenes => Some(JobInput::DetectScenes),
            JobKind::DescribeFrames => Some(JobInput::DescribeFrames),
            JobKind::IndexScenes => Some(JobInput::IndexScenes),
            JobKind::SelectClips => Some(JobInput::SelectClips),
            _ => None,
        }
    }
}

/// One unit of asynchronous work tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub job_id: JobId,

    /// Owning media
    pub media_id: MediaId,

    /// Job kind (redundant with input, kept for cheap filtering)
    pub kind: JobKind,

    /// Kind-specific input
    pub input: JobInput,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Attempt number, starting at 1. A failed job is superseded by a fresh
    /// job with this incremented; the original record is never mutated after
    /// it reaches a terminal status.
    #[serde(default = "default_attempt")]
    pub attempt: u32,

    /// Kind-specific result payload (set on Completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Structured error (set on Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Cooperative cancellation flag polled by handlers at safe points
    #[serde(default)]
    pub cancel_requested: bool,

    /// When the job entered the queue
    pub enqueued_at: DateTime<Utc>,

    /// When a worker claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

fn default_attempt() -> u32 {
    1
}

impl Job {
    /// Create a new queued job.
    pub fn new(media_id: MediaId, input: JobInput) -> Self {
        Self {
            job_id: JobId::new(),
            media_id,
            kind: input.kind(),
            input,
            status: JobStatus::Queued,
            attempt: 1,
            result: None,
            error: None,
            cancel_requested: false,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Create the successor of a failed job: same media and input, fresh id,
    /// incremented attempt.
    pub fn successor(&self) -> Self {
        let mut next = Job::new(self.media_id.clone(), self.input.clone());
        next.attempt = self.attempt + 1;
        next
    }

    /// Mark as running.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    /// Mark as completed with an optional result payload.
    pub fn complete(mut self, result: Option<serde_json::Value>) -> Self {
        self.status = JobStatus::Completed;
        self.result = result;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Mark as failed.
    pub fn fail(mut self, error: JobError) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        self
    }

    /// Mark as cancelled.
    pub fn cancel(mut self) -> Self {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self
    }
}
