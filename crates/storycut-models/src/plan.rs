//! Plans, EDLs and the planner JSON contract.
//!
//! `RawPlan` is the exact shape an external model is asked to produce.
//! A `Plan` only ever comes out of the validator: bounds clipped, keep
//! segments sorted and merged, timestamps rounded to milliseconds.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{MediaId, PlanId};

/// EDL segment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Contents appear in the output
    Keep,
    /// Time range omitted from the output
    Skip,
    /// Omitted from the output; rendered as a jump cut
    Transition,
}

/// One EDL entry over the source timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdlSegment {
    pub start: f64,
    pub end: f64,
    pub kind: SegmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EdlSegment {
    /// A bare keep segment.
    pub fn keep(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            kind: SegmentKind::Keep,
            transition_kind: None,
            transition_duration: None,
            reason: None,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Narrative anchor points on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryArc {
    pub hook_t: f64,
    pub climax_t: f64,
    pub resolution_t: f64,
}

impl StoryArc {
    /// Strictly ordered hook < climax < resolution.
    pub fn is_ordered(&self) -> bool {
        self.hook_t < self.climax_t && self.climax_t < self.resolution_t
    }
}

/// Advisory key moment from the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeyMoment {
    pub start: f64,
    pub end: f64,
    /// "high" | "medium" | "low"
    #[serde(default)]
    pub importance: String,
    /// "hook" | "build" | "climax" | "resolution"
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub reason: String,
}

/// Advisory transition suggestion from the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    pub from: f64,
    pub to: f64,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
}

/// Advisory recommendation from the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// "high" | "medium" | "low"
    #[serde(default)]
    pub priority: String,
}

/// Non-blocking finding recorded by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanWarning {
    /// Stable warning code, e.g. "coverage", "story_arc", "merged_segments"
    pub code: String,
    pub message: String,
}

impl PlanWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Model token usage recorded on a `PlanStory` job result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Plan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Validated,
    Rendering,
    Rendered,
    Rejected,
}

impl PlanStatus {
    /// Whether `self -> next` is a legal edge. `Rendered -> Rendering` and
    /// `Rendering -> Validated` allow any number of re-renders.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (PlanStatus::Draft, PlanStatus::Validated)
                | (PlanStatus::Draft, PlanStatus::Rejected)
                | (PlanStatus::Validated, PlanStatus::Rendering)
                | (PlanStatus::Rendering, PlanStatus::Rendered)
                | (PlanStatus::Rendering, PlanStatus::Validated)
                | (PlanStatus::Rendered, PlanStatus::Rendering)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Validated => "validated",
            PlanStatus::Rendering => "rendering",
            PlanStatus::Rendered => "rendered",
            PlanStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Heuristic,
    Story,
}

/// A validated, renderable plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub plan_id: PlanId,
    pub media_id: MediaId,
    #[serde(default)]
    pub status: PlanStatus,
    pub mode: PlanMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_arc: Option<StoryArc>,

    /// Sanitised EDL, keep segments sorted and non-overlapping
    pub edl: Vec<EdlSegment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_moments: Vec<KeyMoment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,

    /// Validator findings; never block rendering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanWarning>,

    /// Target output length as a fraction of source duration
    pub desired_length_pct: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create a plan shell; the validator fills and sanitises the EDL.
    pub fn new(media_id: MediaId, mode: PlanMode, desired_length_pct: f64) -> Self {
        let now = Utc::now();
        Self {
            plan_id: PlanId::new(),
            media_id,
            status: PlanStatus::Draft,
            mode,
            story_arc: None,
            edl: Vec::new(),
            key_moments: Vec::new(),
            transitions: Vec::new(),
            recommendations: Vec::new(),
            warnings: Vec::new(),
            desired_length_pct,
            created_at: now,
            updated_at: now,
        }
    }

    /// Keep segments in EDL order.
    pub fn keep_segments(&self) -> Vec<&EdlSegment> {
        self.edl
            .iter()
            .filter(|s| s.kind == SegmentKind::Keep)
            .collect()
    }

    /// Total keep duration in seconds; equals the output duration.
    pub fn total_keep(&self) -> f64 {
        self.keep_segments().iter().map(|s| s.duration()).sum()
    }

    /// Map a source timestamp to its position on the output timeline.
    ///
    /// Returns `None` when `t` falls outside every keep segment (that
    /// source time does not appear in the output). Keep segments must be
    /// sorted and non-overlapping, which the validator guarantees.
    pub fn source_to_output(&self, t: f64) -> Option<f64> {
        let mut offset = 0.0;
        for seg in self.keep_segments() {
            if t >= seg.start && t < seg.end {
                return Some(offset + (t - seg.start));
            }
            offset += seg.duration();
        }
        None
    }

    /// Whether some keep segment contains `t`.
    pub fn covers(&self, t: f64) -> bool {
        self.keep_segments()
            .iter()
            .any(|s| t >= s.start && t < s.end)
    }
}

// ============================================================================
// Planner JSON contract (raw model output)
// ============================================================================

/// One raw EDL entry as the model emits it. `kind` stays a free string so a
/// sloppy response still parses; the validator maps and drops unknowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The exact JSON object the planner model must return.
/// Unknown fields are ignored on parse and therefore dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct RawPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_arc: Option<StoryArc>,
    #[serde(default)]
    pub key_moments: Vec<KeyMoment>,
    #[serde(default)]
    pub edl: Vec<RawSegment>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl RawPlan {
    /// Build a raw plan from bare keep windows (heuristic path).
    pub fn from_keep_windows(windows: &[(f64, f64)]) -> Self {
        Self {
            edl: windows
                .iter()
                .map(|&(start, end)| RawSegment {
                    start,
                    end,
                    kind: "keep".to_string(),
                    transition_kind: None,
                    transition_duration: None,
                    reason: None,
                })
                .collect(),
            ..Default::default()
        }
    }
}
