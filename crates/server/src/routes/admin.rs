//! Health, readiness, catalog metadata, and the reindex trigger.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use index::SearchProvider;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Liveness: answers as long as the process runs.
pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Readiness: the entity alias must exist and the cluster must be
/// reachable at yellow or better.
pub async fn readyz(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let aliased = state.provider.alias_indices(state.naming.alias()).await?;
    if aliased.is_empty() {
        return Err(AppError::IndexNotReady(
            "no dataset index has been built yet".to_string(),
        ));
    }
    if !state.provider.check_health().await {
        return Err(AppError::IndexNotReady("search cluster is unhealthy".to_string()));
    }
    Ok(Json(json!({"status": "ok"})))
}

/// The resolved dataset catalog.
pub async fn catalog(State(state): State<Arc<AppState>>) -> Json<Value> {
    let catalog = state.catalog.read().await;
    let datasets: Vec<Value> = catalog
        .iter()
        .map(|dataset| {
            json!({
                "name": dataset.name,
                "title": dataset.title,
                "load": dataset.load,
                "version": dataset.version,
                "children": dataset.children,
            })
        })
        .collect();
    Json(json!({"datasets": datasets}))
}

/// The enabled scoring algorithms with their feature documentation.
pub async fn algorithms() -> Json<Value> {
    let docs: Vec<Value> = matcher::algorithm_names()
        .iter()
        .filter_map(|name| matcher::get_algorithm(name).ok())
        .map(|algorithm| serde_json::to_value(algorithm.explain()).unwrap_or(Value::Null))
        .collect();
    Json(json!({
        "algorithms": docs,
        "default": matcher::DEFAULT_ALGORITHM,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    #[serde(default)]
    pub token: String,
    /// Block until the update pass completes.
    #[serde(default)]
    pub sync: bool,
    /// Rebuild every dataset even when it looks current.
    #[serde(default)]
    pub force: bool,
}

/// Trigger an update pass, gated by the shared update token.
pub async fn updatez(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UpdateParams>,
) -> AppResult<Json<Value>> {
    let expected = state.settings.update_token.trim();
    if expected.is_empty() || params.token.trim().is_empty() || params.token != expected {
        return Err(AppError::Forbidden("Invalid token.".to_string()));
    }
    if params.sync {
        let summary = state.run_update(params.force).await?;
        return Ok(Json(json!({
            "status": "ok",
            "updated": summary.updated,
            "skipped": summary.skipped,
            "failed": summary.failed,
        })));
    }
    let state = state.clone();
    let force = params.force;
    tokio::spawn(async move {
        if let Err(err) = state.run_update(force).await {
            tracing::error!(error = %err, "background update failed");
        }
    });
    Ok(Json(json!({"status": "ok"})))
}
