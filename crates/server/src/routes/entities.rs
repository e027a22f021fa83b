//! Entity retrieval with nested graph expansion.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header::LOCATION, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::Query;
use serde::Deserialize;

use index::{get_adjacent, get_entity, serialize_entity, AdjacentPage, FetchResult};
use model::Entity;

use crate::error::{AppError, AppResult};
use crate::routes::limit_window;
use crate::state::AppState;

fn default_nested() -> bool {
    true
}

fn default_limit() -> usize {
    10
}

/// A referent id answers with a classic moved-permanently redirect to the
/// canonical entity.
fn moved_permanently(location: &str) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location.to_string())]).into_response()
}

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    /// Resolve adjacent entities one edge deep.
    #[serde(default = "default_nested")]
    pub nested: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdjacentParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// Fetch the canonical entity behind an id, or the redirect target for a
/// referent id.
async fn resolve(state: &AppState, entity_id: &str) -> AppResult<Result<Entity, String>> {
    match get_entity(state.provider.as_ref(), state.naming.alias(), entity_id).await? {
        None => Err(AppError::NotFound("No such entity.".to_string())),
        Some(FetchResult::Redirect(canonical)) => Ok(Err(canonical)),
        Some(FetchResult::Entity(entity)) => Ok(Ok(entity)),
    }
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(params): Query<FetchParams>,
) -> AppResult<Response> {
    match resolve(&state, &entity_id).await? {
        Err(canonical) => {
            tracing::info!(entity_id = entity_id.as_str(), canonical = canonical.as_str(), "referent redirect");
            Ok(moved_permanently(&format!("/entities/{canonical}")))
        }
        Ok(entity) => {
            let serialized = serialize_entity(
                state.provider.as_ref(),
                state.naming.alias(),
                &entity,
                params.nested,
            )
            .await?;
            tracing::info!(entity_id = entity_id.as_str(), caption = entity.caption(), "entity");
            Ok(Json(serialized).into_response())
        }
    }
}

async fn adjacent_common(
    state: &AppState,
    entity_id: &str,
    prop: Option<&str>,
    params: &AdjacentParams,
) -> AppResult<Response> {
    let (limit, offset) = limit_window(params.limit, params.offset)?;
    match resolve(state, entity_id).await? {
        Err(canonical) => {
            let suffix = prop.map(|p| format!("/{p}")).unwrap_or_default();
            Ok(moved_permanently(&format!("/entities/{canonical}/adjacent{suffix}")))
        }
        Ok(entity) => {
            let pages: BTreeMap<String, AdjacentPage> = get_adjacent(
                state.provider.as_ref(),
                state.naming.alias(),
                &entity,
                prop,
                limit,
                offset,
            )
            .await?;
            match prop {
                Some(prop) => {
                    let page = pages
                        .into_values()
                        .next()
                        .ok_or_else(|| AppError::NotFound(format!("no adjacent property: {prop}")))?;
                    Ok(Json(page).into_response())
                }
                None => Ok(Json(pages).into_response()),
            }
        }
    }
}

pub async fn adjacent(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(params): Query<AdjacentParams>,
) -> AppResult<Response> {
    adjacent_common(&state, &entity_id, None, &params).await
}

pub async fn adjacent_prop(
    State(state): State<Arc<AppState>>,
    Path((entity_id, prop)): Path<(String, String)>,
    Query(params): Query<AdjacentParams>,
) -> AppResult<Response> {
    adjacent_common(&state, &entity_id, Some(&prop), &params).await
}
