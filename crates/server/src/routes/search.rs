//! The interactive full-text search endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use index::{
    facet_aggregations, parse_sorts, prefix_query, result_entities, text_query, FilterSpec,
    NestedEntity, SearchOpts, SearchProvider, Total,
};
use model::Catalog;

use crate::error::{AppError, AppResult};
use crate::routes::limit_window;
use crate::state::AppState;

fn default_schema() -> String {
    "Thing".to_string()
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub include_dataset: Vec<String>,
    #[serde(default)]
    pub exclude_dataset: Vec<String>,
    #[serde(default)]
    pub exclude_schema: Vec<String>,
    /// Only entities changed after this timestamp (`last_change`).
    #[serde(default)]
    pub changed_since: Option<String>,
    #[serde(default)]
    pub target: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub fuzzy: bool,
    /// `field:asc|desc`, repeatable.
    #[serde(default)]
    pub sort: Vec<String>,
    #[serde(default)]
    pub facets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchFacetItem {
    pub name: String,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchFacet {
    pub label: String,
    pub values: Vec<SearchFacetItem>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub results: Vec<NestedEntity>,
    pub total: Total,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, SearchFacet>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(dataset): Path<String>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResults>> {
    let dataset = state.get_dataset(&dataset).await?;
    let (limit, offset) = limit_window(params.limit, params.offset)?;
    let schema = model::schema::get(&params.schema)
        .ok_or_else(|| AppError::Invalid(format!("Invalid schema: {}", params.schema)))?;

    let spec = FilterSpec {
        fields: vec![
            ("countries".to_string(), params.countries.clone()),
            ("topics".to_string(), params.topics.clone()),
        ],
        include_dataset: params.include_dataset.clone(),
        exclude_dataset: params.exclude_dataset.clone(),
        exclude_schema: params.exclude_schema.clone(),
        exclude_entity_ids: Vec::new(),
        changed_since: params.changed_since.clone(),
        target: params.target,
    };
    let q = names::safe_string(&params.q);
    let query = text_query(&dataset, schema, &q, &spec, params.fuzzy);
    let opts = SearchOpts {
        size: Some(limit),
        from: Some(offset),
        sort: parse_sorts(&params.sort),
        aggregations: facet_aggregations(&params.facets),
        rank_precise: false,
    };
    let response = state
        .provider
        .search(state.naming.alias(), query, opts)
        .await?;

    let results = result_entities(&response)
        .into_iter()
        .map(|(entity, _)| NestedEntity::from_entity(&entity))
        .collect();
    let facets = {
        let catalog = state.catalog.read().await;
        build_facets(response.aggregations.as_ref(), &catalog)
    };

    tracing::info!(
        query = params.q.as_str(),
        dataset = dataset.name.as_str(),
        total = response.total.value,
        "search"
    );
    Ok(Json(SearchResults {
        results,
        total: response.total,
        limit,
        offset,
        facets,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SuggestItem {
    pub id: String,
    pub name: String,
    pub schema: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestResults {
    pub results: Vec<SuggestItem>,
    pub total: Total,
}

/// Type-ahead completion over entity names.
pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Path(dataset): Path<String>,
    Query(params): Query<SuggestParams>,
) -> AppResult<Json<SuggestResults>> {
    let dataset = state.get_dataset(&dataset).await?;
    let (limit, _) = limit_window(params.limit, 0)?;
    let prefix = names::safe_string(&params.prefix);
    let query = prefix_query(&dataset, &prefix);
    let response = state
        .provider
        .search(state.naming.alias(), query, SearchOpts::sized(limit))
        .await?;
    let results = result_entities(&response)
        .into_iter()
        .map(|(entity, _)| SuggestItem {
            name: entity.caption().to_string(),
            schema: entity.schema.clone(),
            id: entity.id,
        })
        .collect();
    Ok(Json(SuggestResults { results, total: response.total }))
}

fn facet_label(field: &str) -> &str {
    match field {
        "datasets" => "Data sources",
        "countries" => "Countries",
        "topics" => "Topics",
        "dates" => "Dates",
        "identifiers" => "Identifiers",
        other => other,
    }
}

fn build_facets(aggregations: Option<&Value>, catalog: &Catalog) -> BTreeMap<String, SearchFacet> {
    let mut facets = BTreeMap::new();
    let Some(aggregations) = aggregations.and_then(Value::as_object) else {
        return facets;
    };
    for (field, agg) in aggregations {
        let mut facet = SearchFacet {
            label: facet_label(field).to_string(),
            values: Vec::new(),
        };
        for bucket in agg["buckets"].as_array().unwrap_or(&Vec::new()) {
            let Some(key) = bucket["key"].as_str() else { continue };
            let mut label = key.to_string();
            if field == "datasets" {
                if let Some(title) = catalog.get(key).and_then(|ds| ds.title.clone()) {
                    label = title;
                }
            }
            facet.values.push(SearchFacetItem {
                name: key.to_string(),
                label,
                count: bucket["doc_count"].as_u64().unwrap_or(0),
            });
        }
        facets.insert(field.clone(), facet);
    }
    facets
}
