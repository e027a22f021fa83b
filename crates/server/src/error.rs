use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Request-level error types, mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    /// Malformed query, invalid schema or algorithm name.
    #[error("{0}")]
    Invalid(String),

    /// Shape-level request errors, including out-of-range paging.
    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Forbidden(String),

    /// The backing index is missing while a query expected it.
    #[error("index not ready: {0}")]
    IndexNotReady(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::IndexNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Client errors carry their detail; server errors only a generic
        // body, the structure goes to the log and the trace id header is
        // the support reference.
        let body = if status.is_client_error() {
            tracing::info!(status = status.as_u16(), detail = %self, "request failed");
            json!({"status": status.as_u16(), "detail": self.to_string()})
        } else {
            tracing::error!(status = status.as_u16(), error = %self, "request errored");
            json!({"status": "error"})
        };
        (status, Json(body)).into_response()
    }
}

impl From<index::IndexError> for AppError {
    fn from(err: index::IndexError) -> Self {
        match err {
            index::IndexError::NotFound(msg) => AppError::NotFound(msg),
            index::IndexError::IndexNotReady(msg) => AppError::IndexNotReady(msg),
            index::IndexError::Invalid(msg) => AppError::Invalid(msg),
            index::IndexError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<model::ModelError> for AppError {
    fn from(err: model::ModelError) -> Self {
        AppError::Invalid(err.to_string())
    }
}

impl From<matcher::MatchError> for AppError {
    fn from(err: matcher::MatchError) -> Self {
        AppError::Invalid(err.to_string())
    }
}

impl From<ingest::IngestError> for AppError {
    fn from(err: ingest::IngestError) -> Self {
        match err {
            ingest::IngestError::Index(err) => err.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_errors_map_to_statuses() {
        let err: AppError = index::IndexError::NotFound("gone".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err: AppError = index::IndexError::IndexNotReady("starting".into()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let err: AppError = index::IndexError::Invalid("syntax".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err: AppError = index::IndexError::Backend("boom".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
