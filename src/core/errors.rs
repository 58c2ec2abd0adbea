use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The generation backend refused the request because of rate limiting.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),
    /// A state-machine invariant was broken (e.g. an unregistered topic reached dispatch).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("unknown branch: {0}")]
    UnknownBranch(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn checkpoint<E: std::fmt::Display>(err: E) -> Self {
        RagError::Checkpoint(err.to_string())
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::RateLimited(_) | RagError::ServiceUnavailable)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::RateLimited(_) | RagError::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RagError::BadRequest(_) | RagError::Config(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) | RagError::UnknownBranch(_) => StatusCode::NOT_FOUND,
            RagError::Generation(_)
            | RagError::Retrieval(_)
            | RagError::Checkpoint(_)
            | RagError::InvariantViolation(_)
            | RagError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = match &self {
            RagError::RateLimited(_) | RagError::ServiceUnavailable => {
                "Service temporarily unavailable, please try again later".to_string()
            }
            RagError::BadRequest(msg)
            | RagError::Config(msg)
            | RagError::NotFound(msg)
            | RagError::UnknownBranch(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "retryable": self.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable_and_maps_to_503() {
        let err = RagError::RateLimited("429 Too Many Requests".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn non_service_errors_are_not_retryable() {
        assert!(!RagError::Checkpoint("disk full".into()).is_retryable());
        assert!(!RagError::InvariantViolation("bad topic".into()).is_retryable());
        assert_eq!(
            RagError::UnknownBranch("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RagError::Config("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RagError::Checkpoint("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
