//! API error types.
//!
//! Every error serialises as `{code, message, details?}` with a stable
//! string code; internal detail is logged, not exposed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("registry error: {0}")]
    Registry(#[from] storycut_registry::RegistryError),

    #[error("worker error: {0}")]
    Worker(#[from] storycut_worker::WorkerError),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Registry(e) if e.is_conflict() => StatusCode::CONFLICT,
            ApiError::Registry(storycut_registry::RegistryError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => code,
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Registry(e) if e.is_conflict() => "Conflict",
            ApiError::Registry(storycut_registry::RegistryError::NotFound(_)) => "NotFound",
            _ => "Internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail is for the log, not the caller
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {}", self);
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: self.code().to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(
            ApiError::bad_request("EmptySource", "no timeline").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("media x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::bad_request("EmptySource", "x").code(),
            "EmptySource"
        );
    }
}
