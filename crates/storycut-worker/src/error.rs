//! Worker error types and classification into the stable error taxonomy.

use thiserror::Error;

use storycut_models::{ErrorCode, JobError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("empty source: {0}")]
    EmptySource(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded after {0} seconds")]
    DeadlineExceeded(u64),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("registry error: {0}")]
    Registry(#[from] storycut_registry::RegistryError),

    #[error("blob store error: {0}")]
    Blob(#[from] storycut_blob::BlobError),

    #[error("media error: {0}")]
    Media(#[from] storycut_media::MediaError),

    #[error("model error: {0}")]
    Ml(#[from] storycut_ml_client::MlError),

    #[error("queue error: {0}")]
    Queue(#[from] storycut_queue::QueueError),

    #[error("plan error: {0}")]
    Plan(#[from] storycut_planner::PlanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the handler observed cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
            || matches!(self, WorkerError::Media(storycut_media::MediaError::Cancelled))
    }

    /// Classify into the stable taxonomy surfaced in `Job.error`.
    pub fn error_code(&self) -> ErrorCode {
        use storycut_media::MediaError;
        use storycut_ml_client::MlError;
        use storycut_planner::PlanError;

        match self {
            WorkerError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            WorkerError::EmptySource(_) => ErrorCode::EmptySource,
            WorkerError::InvalidPlan(_) => ErrorCode::InvalidPlan,
            WorkerError::Cancelled => ErrorCode::Cancelled,
            WorkerError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,

            WorkerError::Media(MediaError::SourceUnreachable(_)) => ErrorCode::SourceUnreachable,
            WorkerError::Media(MediaError::UnrecognisedFormat(_)) => ErrorCode::UnrecognisedFormat,
            WorkerError::Media(MediaError::NoAudioTrack) => ErrorCode::NoAudioTrack,
            WorkerError::Media(MediaError::Cancelled) => ErrorCode::Cancelled,
            WorkerError::Media(MediaError::Timeout(_)) => ErrorCode::DeadlineExceeded,
            WorkerError::Media(MediaError::CorruptIntermediate(_)) => {
                ErrorCode::CorruptIntermediate
            }
            WorkerError::Media(MediaError::FfmpegFailed { .. }) => ErrorCode::EncodeError,
            WorkerError::Media(_) => ErrorCode::Internal,

            WorkerError::Ml(MlError::RateLimited) => ErrorCode::ExternalModelRateLimited,
            WorkerError::Ml(MlError::Timeout) => ErrorCode::ExternalModelTimeout,
            WorkerError::Ml(MlError::PlanParse(_)) => ErrorCode::InvalidPlan,
            WorkerError::Ml(e) if e.is_retryable() => ErrorCode::ExternalModelTimeout,
            WorkerError::Ml(_) => ErrorCode::Internal,

            WorkerError::Plan(PlanError::EmptySource) => ErrorCode::EmptySource,
            WorkerError::Plan(_) => ErrorCode::InvalidPlan,

            WorkerError::Blob(_) => ErrorCode::BlobStoreUnavailable,
            WorkerError::Io(_) => ErrorCode::OutputWriteError,

            WorkerError::JobFailed(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Registry(_)
            | WorkerError::Queue(_)
            | WorkerError::Serialization(_) => ErrorCode::Internal,
        }
    }

    /// Project into the structured error stored on the job record.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.error_code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_media::MediaError;
    use storycut_ml_client::MlError;

    #[test]
    fn classification_matches_taxonomy() {
        let e = WorkerError::Media(MediaError::SourceUnreachable("http://x".into()));
        assert_eq!(e.error_code(), ErrorCode::SourceUnreachable);
        assert!(!e.error_code().is_retryable());

        let e = WorkerError::Ml(MlError::RateLimited);
        assert_eq!(e.error_code(), ErrorCode::ExternalModelRateLimited);
        assert!(e.error_code().is_retryable());

        let e = WorkerError::Ml(MlError::PlanParse("nope".into()));
        assert_eq!(e.error_code(), ErrorCode::InvalidPlan);
        assert!(!e.error_code().is_retryable());

        let e = WorkerError::Media(MediaError::FfmpegFailed {
            message: "encode".into(),
            stderr: None,
            exit_code: Some(1),
        });
        assert_eq!(e.error_code(), ErrorCode::EncodeError);
        assert!(e.error_code().is_retryable());
    }

    #[test]
    fn cancellation_is_detected_through_media_errors() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(WorkerError::Media(MediaError::Cancelled).is_cancelled());
        assert!(!WorkerError::job_failed("x").is_cancelled());
    }
}
