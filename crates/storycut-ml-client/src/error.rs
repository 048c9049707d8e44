//! Model client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("model rate limited")]
    RateLimited,

    #[error("model request timed out")]
    Timeout,

    #[error("plan response did not parse: {0}")]
    PlanParse(String),

    #[error("transcript response did not parse: {0}")]
    TranscriptParse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the orchestrator should classify this as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::RateLimited | MlError::Timeout => true,
            MlError::Http(e) => e.is_timeout() || e.is_connect(),
            MlError::Endpoint { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
