//! Nested entity serialization and adjacency.
//!
//! Fetching an entity can expand its graph neighborhood one edge deep:
//! outgoing entity-typed values and incoming references are resolved, and
//! relationship entities (edge schemata) are expanded once more so their
//! far side is visible. Cycles are broken by threading the visited id path
//! through the recursion; entities never hold back-references.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{json, Value};

use model::{schema, Entity, PropType};

use crate::error::IndexError;
use crate::provider::{SearchOpts, SearchProvider, Total};
use crate::queries::MAX_RESULTS;
use crate::results::result_entities;

/// Upper bound on graph expansion rounds; the visited set makes the loop
/// terminate anyway, this guards against pathological data.
const MAX_ROUNDS: usize = 50;

/// An entity as served by the API, with adjacent entities folded into the
/// property values.
#[derive(Debug, Clone, Serialize)]
pub struct NestedEntity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub schema: String,
    pub properties: BTreeMap<String, Vec<Value>>,
    pub datasets: Vec<String>,
    pub referents: Vec<String>,
    pub target: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<String>,
}

impl NestedEntity {
    /// Serialize an entity as-is, entity references left as id strings.
    pub fn from_entity(entity: &Entity) -> NestedEntity {
        NestedEntity {
            id: entity.id.clone(),
            caption: Some(entity.caption().to_string()),
            schema: entity.schema.clone(),
            properties: entity
                .properties
                .iter()
                .map(|(name, values)| {
                    (name.clone(), values.iter().map(|v| json!(v)).collect())
                })
                .collect(),
            datasets: entity.datasets.iter().cloned().collect(),
            referents: entity.referents.iter().cloned().collect(),
            target: entity.target,
            first_seen: entity.first_seen.clone(),
            last_seen: entity.last_seen.clone(),
            last_change: entity.last_change.clone(),
        }
    }
}

type Entities = HashMap<String, Option<Entity>>;
type Inverted = HashMap<String, Vec<(String, String)>>;

/// Serialize an entity, optionally resolving its neighborhood.
pub async fn serialize_entity(
    provider: &dyn SearchProvider,
    alias: &str,
    root: &Entity,
    nested: bool,
) -> Result<NestedEntity, IndexError> {
    if !nested {
        return Ok(NestedEntity::from_entity(root));
    }
    let (entities, inverted) = collect_neighborhood(provider, alias, root).await?;
    let mut path = Vec::new();
    Ok(nest_entity(root, &entities, &inverted, &mut path))
}

/// Iteratively fetch the entities adjacent to the root: documents the root
/// points at, documents pointing at the root, and one hop past any edge
/// entity among them.
async fn collect_neighborhood(
    provider: &dyn SearchProvider,
    alias: &str,
    root: &Entity,
) -> Result<(Entities, Inverted), IndexError> {
    let mut entities: Entities = HashMap::new();
    entities.insert(root.id.clone(), Some(root.clone()));
    for forward in root.typed_values(PropType::Entity, false) {
        entities.entry(forward.to_string()).or_insert(None);
    }
    let mut inverted: Inverted = HashMap::new();
    let mut reverse: Vec<String> = vec![root.id.clone()];

    for _ in 0..MAX_ROUNDS {
        let mut shoulds: Vec<Value> = Vec::new();
        if !reverse.is_empty() {
            shoulds.push(json!({"terms": {"entities": reverse}}));
        }
        let unresolved: Vec<&String> = entities
            .iter()
            .filter_map(|(id, entity)| entity.is_none().then_some(id))
            .collect();
        if !unresolved.is_empty() {
            shoulds.push(json!({"ids": {"values": unresolved}}));
        }
        if shoulds.is_empty() {
            break;
        }
        let seen: Vec<&String> = entities
            .iter()
            .filter_map(|(id, entity)| entity.is_some().then_some(id))
            .collect();
        let query = json!({
            "bool": {
                "should": shoulds,
                "minimum_should_match": 1,
                "must_not": [{"ids": {"values": seen}}],
            }
        });
        let response = provider
            .search(alias, query, SearchOpts::sized(MAX_RESULTS))
            .await?;

        reverse = Vec::new();
        let found = result_entities(&response);
        if found.is_empty() {
            // Mark unresolved ids as missing so the loop can end.
            for entity in entities.values_mut() {
                if entity.is_none() {
                    *entity = Some(missing_placeholder());
                }
            }
            continue;
        }
        for (adjacent, _) in found {
            let is_edge = adjacent.schema().edge;
            if is_edge {
                reverse.push(adjacent.id.clone());
            }
            for (prop, value) in adjacent_entity_values(&adjacent) {
                if is_edge {
                    entities.entry(value.to_string()).or_insert(None);
                }
                inverted
                    .entry(value.to_string())
                    .or_default()
                    .push((prop.to_string(), adjacent.id.clone()));
            }
            entities.insert(adjacent.id.clone(), Some(adjacent));
        }
    }

    entities.retain(|_, entity| {
        !matches!(entity, Some(placeholder) if placeholder.id.is_empty())
    });
    Ok((entities, inverted))
}

/// A sentinel for ids the index no longer resolves.
fn missing_placeholder() -> Entity {
    Entity {
        id: String::new(),
        caption: None,
        schema: "Thing".to_string(),
        properties: BTreeMap::new(),
        datasets: Default::default(),
        referents: Default::default(),
        target: false,
        first_seen: None,
        last_seen: None,
        last_change: None,
    }
}

fn adjacent_entity_values(entity: &Entity) -> Vec<(&str, &str)> {
    let schema = entity.schema();
    entity
        .iter_values()
        .filter(|(prop, _)| {
            schema
                .property(prop)
                .map(|p| p.prop_type == PropType::Entity)
                .unwrap_or(false)
        })
        .collect()
}

/// Recursively fold resolved neighbors into the property values, keeping
/// plain id strings where nothing was resolved.
fn nest_entity(
    entity: &Entity,
    entities: &Entities,
    inverted: &Inverted,
    path: &mut Vec<String>,
) -> NestedEntity {
    let mut serialized = NestedEntity::from_entity(entity);
    path.push(entity.id.clone());

    // Incoming references, grouped under the reverse property name.
    if let Some(incoming) = inverted.get(&entity.id) {
        for (prop, source_id) in incoming {
            if path.contains(source_id) {
                continue;
            }
            let Some(Some(source)) = entities.get(source_id) else { continue };
            let Some(reverse) = schema::reverse_name(&source.schema, prop) else { continue };
            let nested = nest_entity(source, entities, inverted, path);
            let value = serde_json::to_value(nested).unwrap_or(Value::Null);
            serialized
                .properties
                .entry(reverse.to_string())
                .or_default()
                .push(value);
        }
    }

    // Outgoing entity references, replaced in place where resolved.
    for (prop, values) in &entity.properties {
        let is_entity_prop = entity
            .schema()
            .property(prop)
            .map(|p| p.prop_type == PropType::Entity)
            .unwrap_or(false);
        if !is_entity_prop {
            continue;
        }
        let mut nested_values: Vec<Value> = Vec::new();
        for value in values {
            if path.contains(value) {
                continue;
            }
            match entities.get(value) {
                Some(Some(target)) => {
                    let nested = nest_entity(target, entities, inverted, path);
                    nested_values.push(serde_json::to_value(nested).unwrap_or(Value::Null));
                }
                _ => nested_values.push(json!(value)),
            }
        }
        serialized.properties.insert(prop.clone(), nested_values);
    }

    path.pop();
    serialized
}

/// One page of adjacency for a single property.
#[derive(Debug, Serialize)]
pub struct AdjacentPage {
    pub results: Vec<NestedEntity>,
    pub total: Total,
}

/// Adjacent entities grouped per property, paginated inside each group.
/// With `prop` given, only that property is returned; an unknown property
/// is a not-found error.
pub async fn get_adjacent(
    provider: &dyn SearchProvider,
    alias: &str,
    root: &Entity,
    prop: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<BTreeMap<String, AdjacentPage>, IndexError> {
    let mut buckets: BTreeMap<String, Vec<NestedEntity>> = BTreeMap::new();

    // Outgoing references.
    let outgoing: Vec<&str> = root.typed_values(PropType::Entity, false);
    let mut resolved: HashMap<String, Entity> = HashMap::new();
    if !outgoing.is_empty() {
        let query = json!({"bool": {"filter": [{"ids": {"values": outgoing}}]}});
        let response = provider
            .search(alias, query, SearchOpts::sized(MAX_RESULTS))
            .await?;
        for (entity, _) in result_entities(&response) {
            resolved.insert(entity.id.clone(), entity);
        }
    }
    for (prop_name, value) in adjacent_entity_values(root) {
        if let Some(entity) = resolved.get(value) {
            buckets
                .entry(prop_name.to_string())
                .or_default()
                .push(NestedEntity::from_entity(entity));
        }
    }

    // Incoming references, named by their reverse property.
    let query = json!({
        "bool": {
            "filter": [{"terms": {"entities": [root.id]}}],
            "must_not": [{"ids": {"values": [root.id]}}],
        }
    });
    let response = provider
        .search(alias, query, SearchOpts::sized(MAX_RESULTS))
        .await?;
    for (adjacent, _) in result_entities(&response) {
        for (prop_name, value) in adjacent_entity_values(&adjacent) {
            if value != root.id {
                continue;
            }
            let Some(reverse) = schema::reverse_name(&adjacent.schema, prop_name) else {
                continue;
            };
            buckets
                .entry(reverse.to_string())
                .or_default()
                .push(NestedEntity::from_entity(&adjacent));
        }
    }

    let mut pages = BTreeMap::new();
    match prop {
        Some(prop) => {
            let Some(results) = buckets.remove(prop) else {
                return Err(IndexError::NotFound(format!("no adjacent property: {prop}")));
            };
            pages.insert(prop.to_string(), paginate(results, limit, offset));
        }
        None => {
            for (name, results) in buckets {
                pages.insert(name, paginate(results, limit, offset));
            }
        }
    }
    Ok(pages)
}

fn paginate(results: Vec<NestedEntity>, limit: usize, offset: usize) -> AdjacentPage {
    let total = Total::eq(results.len() as u64);
    let results = results.into_iter().skip(offset).take(limit).collect();
    AdjacentPage { results, total }
}
