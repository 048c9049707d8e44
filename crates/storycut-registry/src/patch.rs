//! Typed patches applied alongside conditional status updates.

use serde_json::Value;

use storycut_models::{JobError, TechnicalMetadata};

/// Fields a media status transition may set.
#[derive(Debug, Clone, Default)]
pub struct MediaPatch {
    /// Probed metadata (set on Registered/Probing -> Ready)
    pub technical: Option<TechnicalMetadata>,
    /// Error message (set on -> Failed)
    pub error: Option<String>,
}

impl MediaPatch {
    pub fn technical(technical: TechnicalMetadata) -> Self {
        Self {
            technical: Some(technical),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Fields a job status transition may set. Timestamps (`started_at`,
/// `finished_at`) are stamped by the registry itself.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    /// Result payload (set on -> Completed)
    pub result: Option<Value>,
    /// Structured error (set on -> Failed)
    pub error: Option<JobError>,
}

impl JobPatch {
    pub fn result(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn error(error: JobError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Fields a render status transition may set.
#[derive(Debug, Clone, Default)]
pub struct RenderPatch {
    /// Output location (set on -> Completed)
    pub output_uri: Option<String>,
    /// Measured output duration in seconds
    pub duration_seconds: Option<f64>,
    /// Structured error (set on -> Failed)
    pub error: Option<JobError>,
}

impl RenderPatch {
    pub fn completed(output_uri: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            output_uri: Some(output_uri.into()),
            duration_seconds: Some(duration_seconds),
            error: None,
        }
    }

    pub fn error(error: JobError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}
