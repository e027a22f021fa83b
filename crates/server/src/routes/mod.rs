//! Route handlers.

pub mod admin;
pub mod entities;
pub mod matching;
pub mod search;

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::config::{MAX_OFFSET, MAX_PAGE};
use crate::error::{AppError, AppResult};

/// Validate the paging window of a search-type endpoint.
pub fn limit_window(limit: usize, offset: usize) -> AppResult<(usize, usize)> {
    if limit > MAX_PAGE {
        return Err(AppError::Unprocessable(format!(
            "limit must not exceed {MAX_PAGE}"
        )));
    }
    if offset > MAX_OFFSET {
        return Err(AppError::Unprocessable(format!(
            "offset must not exceed {MAX_OFFSET}"
        )));
    }
    Ok((limit, offset))
}

/// Service metadata at the root path.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "sanscreen",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/search/{dataset}", "/match/{dataset}", "/entities/{id}", "/catalog", "/algorithms", "/healthz", "/readyz"],
    }))
}

/// Fallback for unknown paths.
pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": 404, "detail": "No such endpoint."})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_window_bounds() {
        assert!(limit_window(10, 0).is_ok());
        assert!(limit_window(MAX_PAGE, MAX_OFFSET).is_ok());
        assert!(matches!(limit_window(MAX_PAGE + 1, 0), Err(AppError::Unprocessable(_))));
        assert!(matches!(limit_window(10, MAX_OFFSET + 1), Err(AppError::Unprocessable(_))));
    }
}
