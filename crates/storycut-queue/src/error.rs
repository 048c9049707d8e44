//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),
}

impl QueueError {
    pub fn enqueue_failed(reason: impl Into<String>) -> Self {
        Self::EnqueueFailed(reason.into())
    }
}
