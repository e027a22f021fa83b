//! The query-by-example batch matcher.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

use index::{
    candidate_limit, entity_query, result_entities, FilterSpec, SearchOpts, SearchProvider, Total,
};
use matcher::{get_algorithm, score_results, AlgorithmDoc, ScoredEntity, ScoringConfig};
use model::Entity;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// One query example: a schema and a property bag, in the same shape the
/// API returns entities.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityExample {
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// The request body: named examples plus optional feature weights.
#[derive(Debug, Deserialize)]
pub struct MatchBody {
    pub queries: BTreeMap<String, Option<EntityExample>>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct MatchParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub cutoff: Option<f64>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub include_dataset: Vec<String>,
    #[serde(default)]
    pub exclude_dataset: Vec<String>,
    #[serde(default)]
    pub exclude_schema: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Only candidates changed after this timestamp (`last_change`).
    #[serde(default)]
    pub changed_since: Option<String>,
    /// Candidates whose canonical id or any referent matches are dropped.
    #[serde(default)]
    pub exclude_entity_ids: Vec<String>,
    #[serde(default)]
    pub fuzzy: Option<bool>,
}

/// The serialized example echoed back with each response.
#[derive(Debug, Serialize)]
pub struct EntityQueryEcho {
    pub id: String,
    pub schema: String,
    pub properties: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct EntityMatches {
    pub status: u16,
    pub results: Vec<ScoredEntity>,
    pub total: Total,
    pub query: EntityQueryEcho,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub responses: BTreeMap<String, EntityMatches>,
    pub matcher: AlgorithmDoc,
    pub limit: usize,
}

pub async fn match_batch(
    State(state): State<Arc<AppState>>,
    Path(dataset): Path<String>,
    Query(params): Query<MatchParams>,
    Json(body): Json<MatchBody>,
) -> AppResult<Json<MatchResponse>> {
    let settings = &state.settings;
    let dataset = state.get_dataset(&dataset).await?;

    let limit = params.limit.unwrap_or(settings.match_page);
    if limit > settings.max_matches {
        return Err(AppError::Unprocessable(format!(
            "limit must not exceed {}",
            settings.max_matches
        )));
    }
    let threshold = params.threshold.unwrap_or(settings.score_threshold);
    let cutoff = params.cutoff.unwrap_or(settings.score_cutoff);
    let fuzzy = params.fuzzy.unwrap_or(settings.match_fuzzy);
    let algorithm_name = params
        .algorithm
        .as_deref()
        .unwrap_or(matcher::DEFAULT_ALGORITHM);
    let algorithm = get_algorithm(algorithm_name)?;
    let scoring_config = ScoringConfig { weights: body.weights.clone() };

    if body.queries.len() > settings.max_batch {
        return Err(AppError::Invalid(format!(
            "Too many queries in one batch (limit: {})",
            settings.max_batch
        )));
    }

    let spec = FilterSpec {
        fields: vec![("topics".to_string(), params.topics.clone())],
        include_dataset: params.include_dataset.clone(),
        exclude_dataset: params.exclude_dataset.clone(),
        exclude_schema: params.exclude_schema.clone(),
        exclude_entity_ids: params.exclude_entity_ids.clone(),
        changed_since: params.changed_since.clone(),
        target: None,
    };

    // Parse every example before running anything, so a bad example fails
    // the batch without wasted candidate queries.
    let mut examples: Vec<(String, Entity)> = Vec::new();
    for (key, example) in &body.queries {
        let Some(example) = example else { continue };
        let entity = Entity::from_example(&example.schema, &example.properties)
            .map_err(|err| AppError::Invalid(format!("Cannot parse example entity: {err}")))?;
        examples.push((key.clone(), entity));
    }
    if examples.is_empty() {
        return Err(AppError::Invalid("No queries provided.".to_string()));
    }

    // Candidate generation fans out concurrently; the provider's query
    // semaphore bounds the actual parallelism.
    let candidates = candidate_limit(limit, settings.match_candidates);
    let searches = examples.iter().map(|(key, entity)| {
        let query = entity_query(&dataset, entity, &spec, fuzzy);
        let opts = SearchOpts {
            size: Some(candidates),
            rank_precise: true,
            ..SearchOpts::default()
        };
        let provider = state.provider.clone();
        let alias = state.naming.alias().to_string();
        async move { (key.clone(), provider.search(&alias, query, opts).await) }
    });
    let generated = futures::future::join_all(searches).await;

    let mut responses = BTreeMap::new();
    for ((key, result), (_, entity)) in generated.into_iter().zip(examples.into_iter()) {
        let response = result?;
        let candidates = result_entities(&response);
        let (total, results) = score_results(
            algorithm,
            &entity,
            candidates,
            threshold,
            cutoff,
            limit,
            &scoring_config,
        )
        .await;
        tracing::info!(
            dataset = dataset.name.as_str(),
            key = key.as_str(),
            schema = entity.schema.as_str(),
            results = total,
            "match"
        );
        responses.insert(
            key,
            EntityMatches {
                status: 200,
                results,
                total: Total::eq(total as u64),
                query: EntityQueryEcho {
                    id: entity.id.clone(),
                    schema: entity.schema.clone(),
                    properties: entity.properties.clone(),
                },
            },
        );
    }

    Ok(Json(MatchResponse {
        responses,
        matcher: algorithm.explain(),
        limit,
    }))
}
