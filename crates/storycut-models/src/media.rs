//! Media records and probed technical metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::MediaId;

/// Media lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    /// Registered, not yet probed
    #[default]
    Registered,
    /// Probe in progress
    Probing,
    /// Technical metadata populated, enrichment may attach
    Ready,
    /// Probe failed
    Failed,
    /// Soft-deleted
    Deleted,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Registered => "registered",
            MediaStatus::Probing => "probing",
            MediaStatus::Ready => "ready",
            MediaStatus::Failed => "failed",
            MediaStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Technical metadata filled in by the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TechnicalMetadata {
    /// Duration in seconds
    pub duration: f64,
    /// Frame rate (fps)
    pub fps: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether the source carries an audio track
    pub has_audio: bool,
    /// Video codec name
    pub video_codec: String,
    /// Audio codec name (empty when no audio track)
    #[serde(default)]
    pub audio_codec: String,
    /// Container bitrate in bits/second
    #[serde(default)]
    pub bitrate: u64,
}

/// One source video tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Media {
    /// Unique media ID
    pub media_id: MediaId,

    /// Source URI (blob-store URI or external HTTP/HTTPS URL)
    pub source_uri: String,

    /// Optional display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Probed technical metadata (present once status is Ready)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalMetadata>,

    /// Lifecycle status
    #[serde(default)]
    pub status: MediaStatus,

    /// Error message (if probing failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Media {
    /// Create a new media record in `Registered` state.
    pub fn new(source_uri: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            media_id: MediaId::new(),
            source_uri: source_uri.into(),
            title: None,
            description: None,
            technical: None,
            status: MediaStatus::Registered,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Source duration in seconds, if probed.
    pub fn duration(&self) -> Option<f64> {
        self.technical.as_ref().map(|t| t.duration)
    }

    /// Whether the media satisfies the `Ready` invariant:
    /// metadata populated and a strictly positive duration.
    pub fn is_ready(&self) -> bool {
        self.status == MediaStatus::Ready
            && self.technical.as_ref().is_some_and(|t| t.duration > 0.0)
    }
}
