//! Turning raw search hits back into entities.

use serde_json::Value;

use model::Entity;

use crate::error::IndexError;
use crate::provider::{Hit, SearchOpts, SearchProvider, SearchResponse};

/// The outcome of a fetch by id.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The canonical record.
    Entity(Entity),
    /// The id was a referent; the caller should redirect to the canonical id.
    Redirect(String),
}

/// Parse one hit into an entity. Referent stub documents (no schema) and
/// undecodable bodies yield `None`.
pub fn result_entity(hit: &Hit) -> Option<Entity> {
    let mut source = hit.source.clone();
    let map = source.as_object_mut()?;
    map.remove("canonical_id");
    map.insert("id".to_string(), Value::String(hit.id.clone()));
    map.get("schema")?;
    match Entity::from_value(source) {
        Ok(entity) => Some(entity),
        Err(err) => {
            tracing::warn!(id = hit.id.as_str(), error = %err, "undecodable entity document");
            None
        }
    }
}

/// Parse every entity hit of a response, keeping the backend score.
pub fn result_entities(response: &SearchResponse) -> Vec<(Entity, f64)> {
    response
        .hits
        .iter()
        .filter_map(|hit| result_entity(hit).map(|entity| (entity, hit.score.unwrap_or(0.0))))
        .collect()
}

/// Fetch a single entity by id, following the referent redirection scheme:
/// a stub document whose `canonical_id` differs from the requested id means
/// the id was merged into another entity.
pub async fn get_entity(
    provider: &dyn SearchProvider,
    alias: &str,
    entity_id: &str,
) -> Result<Option<FetchResult>, IndexError> {
    let query = serde_json::json!({
        "bool": {"filter": [{"ids": {"values": [entity_id]}}]}
    });
    let response = provider.search(alias, query, SearchOpts::sized(5)).await?;
    for hit in &response.hits {
        let canonical = hit.source.get("canonical_id").and_then(Value::as_str);
        if let Some(canonical) = canonical {
            if canonical != entity_id {
                return Ok(Some(FetchResult::Redirect(canonical.to_string())));
            }
        }
        if let Some(entity) = result_entity(hit) {
            return Ok(Some(FetchResult::Entity(entity)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_round_trips_to_entity() {
        let hit = Hit {
            id: "Q7747".to_string(),
            score: Some(3.5),
            source: json!({
                "canonical_id": "Q7747",
                "schema": "Person",
                "properties": {"name": ["Vladimir Putin"]},
                "names": ["Vladimir Putin"],
                "text": ["Vladimir Putin"],
            }),
        };
        let entity = result_entity(&hit).unwrap();
        assert_eq!(entity.id, "Q7747");
        assert_eq!(entity.schema, "Person");
    }

    #[test]
    fn stub_documents_are_skipped() {
        let hit = Hit {
            id: "gb-hmt-14196".to_string(),
            score: None,
            source: json!({"canonical_id": "Q7747"}),
        };
        assert!(result_entity(&hit).is_none());
    }
}
