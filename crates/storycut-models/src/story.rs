//! Story requirements supplied by the caller for LLM planning.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Caller-supplied story requirements for a `PlanStory` job.
///
/// `desired_length_pct` is a fraction of the source duration in `(0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryBrief {
    /// The story the edit should tell, in the caller's words
    pub story_prompt: String,

    /// Optional one-line summary of the source material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Intended audience, e.g. "developers", "general public"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,

    /// Tone, e.g. "energetic", "calm documentary"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    /// The single message the edit must land
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_message: Option<String>,

    /// Free-form arc descriptors ("open on the reveal", "end on the call to action")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub story_arc: Vec<String>,

    /// Style preferences ("fast cuts", "let moments breathe")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style_preferences: Vec<String>,

    /// Target output length as a fraction of source duration
    pub desired_length_pct: f64,

    /// Reject (rather than warn) when coverage falls outside tolerance
    #[serde(default)]
    pub strict_coverage: bool,
}

impl StoryBrief {
    /// Minimal brief with just a prompt and a target length.
    pub fn new(story_prompt: impl Into<String>, desired_length_pct: f64) -> Self {
        Self {
            story_prompt: story_prompt.into(),
            summary: None,
            target_audience: None,
            tone: None,
            key_message: None,
            story_arc: Vec::new(),
            style_preferences: Vec::new(),
            desired_length_pct,
            strict_coverage: false,
        }
    }
}
