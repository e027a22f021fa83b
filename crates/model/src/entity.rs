//! The entity record.
//!
//! An entity is a typed bag of multivalued properties, together with the
//! datasets it appears in, the previous identifiers that were merged into
//! it, and observation timestamps. The same structure is used for indexed
//! records, for query examples, and for API responses.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::property::PropType;
use crate::schema::{self, Schema};

/// A typed record identified by a stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub datasets: BTreeSet<String>,
    #[serde(default)]
    pub referents: BTreeSet<String>,
    #[serde(default)]
    pub target: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change: Option<String>,
}

impl Entity {
    /// Build an entity from a wire or index document. Sidecar fields that
    /// the indexer adds (`names`, `text`, `canonical_id`, ...) are ignored;
    /// the schema tag must be part of the taxonomy.
    pub fn from_value(data: Value) -> Result<Entity, ModelError> {
        let entity: Entity = serde_json::from_value(data)
            .map_err(|err| ModelError::InvalidEntity(err.to_string()))?;
        if entity.id.is_empty() {
            return Err(ModelError::InvalidEntity("missing entity id".into()));
        }
        schema::get(&entity.schema)
            .ok_or_else(|| ModelError::UnknownSchema(entity.schema.clone()))?;
        Ok(entity)
    }

    /// Build an entity from a query example submitted to the matcher.
    ///
    /// Unknown properties are dropped with a warning rather than failing
    /// the request. Values may be given as a single string or a list.
    /// Countries are enriched from country-hinting value types, and a
    /// display name is synthesized from name parts when no name was given.
    pub fn from_example(
        schema_name: &str,
        properties: &BTreeMap<String, Value>,
    ) -> Result<Entity, ModelError> {
        let schema = schema::get(schema_name)
            .ok_or_else(|| ModelError::UnknownSchema(schema_name.to_string()))?;

        let mut entity = Entity {
            id: "example".to_string(),
            caption: None,
            schema: schema.name.to_string(),
            properties: BTreeMap::new(),
            datasets: BTreeSet::new(),
            referents: BTreeSet::new(),
            target: false,
            first_seen: None,
            last_seen: None,
            last_change: None,
        };

        for (name, value) in properties {
            let Some(prop) = schema.property(name) else {
                tracing::warn!(prop = name.as_str(), schema = schema.name, "dropping unknown property");
                continue;
            };
            let values = coerce_values(value);
            if values.is_empty() {
                continue;
            }
            let values = match prop.prop_type {
                PropType::Country => values.iter().map(|v| clean_country(v)).collect(),
                _ => values,
            };
            entity.add_values(name, values);
        }

        combine_names(&mut entity);
        infer_countries(&mut entity, schema);
        Ok(entity)
    }

    /// The resolved schema for this entity. Valid by construction.
    pub fn schema(&self) -> &'static Schema {
        schema::get(&self.schema).expect("entity carries a validated schema")
    }

    /// Append values to a property, keeping existing ones and dropping
    /// duplicates and empty strings.
    pub fn add_values<I, S>(&mut self, prop: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.properties.entry(prop.to_string()).or_default();
        for value in values {
            let value = value.into();
            let trimmed = value.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !slot.iter().any(|v| v == trimmed) {
                slot.push(trimmed.to_string());
            }
        }
    }

    /// Values of a single property, empty when absent.
    pub fn values(&self, prop: &str) -> &[String] {
        self.properties.get(prop).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All values across properties of the given type. With `matchable`,
    /// only values of matchable properties are returned.
    pub fn typed_values(&self, prop_type: PropType, matchable: bool) -> Vec<&str> {
        let schema = self.schema();
        let mut out = Vec::new();
        for (name, values) in &self.properties {
            let Some(prop) = schema.property(name) else { continue };
            if prop.prop_type != prop_type {
                continue;
            }
            if matchable && !prop.matchable {
                continue;
            }
            for value in values {
                if !out.contains(&value.as_str()) {
                    out.push(value.as_str());
                }
            }
        }
        out
    }

    /// The names this entity is known by, matchable aliases included.
    pub fn names(&self) -> Vec<&str> {
        self.typed_values(PropType::Name, false)
    }

    /// Pairs of `(property, value)` for every property value.
    pub fn iter_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// The display caption: the explicit one, else the first name, else the id.
    pub fn caption(&self) -> &str {
        if let Some(caption) = &self.caption {
            return caption;
        }
        self.values("name").first().map(String::as_str).unwrap_or(&self.id)
    }
}

fn coerce_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn clean_country(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() == 2 {
        return trimmed.to_lowercase();
    }
    // Accept a handful of common long forms in query examples.
    match trimmed.to_lowercase().as_str() {
        "russia" | "russian federation" => "ru".to_string(),
        "united states" | "united states of america" | "usa" => "us".to_string(),
        "united kingdom" | "great britain" => "gb".to_string(),
        "germany" => "de".to_string(),
        "france" => "fr".to_string(),
        "china" => "cn".to_string(),
        "ukraine" => "ua".to_string(),
        "belarus" => "by".to_string(),
        "iran" => "ir".to_string(),
        "north korea" => "kp".to_string(),
        "syria" => "sy".to_string(),
        other => other.to_string(),
    }
}

/// Synthesize a full name from name parts when no name value was given.
fn combine_names(entity: &mut Entity) {
    if !entity.values("name").is_empty() {
        return;
    }
    let parts: Vec<&str> = ["firstName", "middleName", "lastName"]
        .iter()
        .flat_map(|part| entity.values(part).first().map(String::as_str))
        .collect();
    if !parts.is_empty() {
        let full = parts.join(" ");
        entity.add_values("name", [full]);
    }
}

/// Add country codes hinted by typed values (IBAN prefixes, phone codes).
fn infer_countries(entity: &mut Entity, schema: &Schema) {
    let existing: BTreeSet<String> = entity
        .typed_values(PropType::Country, false)
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut hints: Vec<String> = Vec::new();
    for (name, values) in &entity.properties {
        let Some(prop) = schema.property(name) else { continue };
        for value in values {
            if let Some(hint) = prop.prop_type.country_hint(value) {
                if !existing.contains(&hint) && !hints.contains(&hint) {
                    hints.push(hint);
                }
            }
        }
    }
    if !hints.is_empty() {
        entity.add_values("country", hints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_wire_entity() {
        let entity = Entity::from_value(json!({
            "id": "Q7747",
            "schema": "Person",
            "properties": {"name": ["Vladimir Putin"], "birthDate": ["1952-10-07"]},
            "datasets": ["eu_fsf"],
            "referents": ["gb-hmt-14196"],
            "target": true,
            "first_seen": "2021-01-01T00:00:00",
        }))
        .unwrap();
        assert_eq!(entity.id, "Q7747");
        assert!(entity.target);
        assert_eq!(entity.names(), vec!["Vladimir Putin"]);
        assert!(entity.referents.contains("gb-hmt-14196"));
    }

    #[test]
    fn unknown_schema_rejected() {
        let err = Entity::from_value(json!({"id": "x", "schema": "Wizard"})).unwrap_err();
        assert!(matches!(err, ModelError::UnknownSchema(_)));
    }

    #[test]
    fn example_drops_unknown_props() {
        let props = BTreeMap::from([
            ("name".to_string(), json!(["John Doe"])),
            ("shoeSize".to_string(), json!(["44"])),
        ]);
        let entity = Entity::from_example("Person", &props).unwrap();
        assert_eq!(entity.names(), vec!["John Doe"]);
        assert!(entity.values("shoeSize").is_empty());
    }

    #[test]
    fn example_accepts_scalar_values() {
        let props = BTreeMap::from([
            ("name".to_string(), json!("Jane Roe")),
            ("country".to_string(), json!("Russia")),
        ]);
        let entity = Entity::from_example("Person", &props).unwrap();
        assert_eq!(entity.values("country"), ["ru"]);
    }

    #[test]
    fn example_infers_countries() {
        let props = BTreeMap::from([
            ("name".to_string(), json!(["Acme GmbH"])),
            ("phone".to_string(), json!(["+493012345678"])),
        ]);
        let entity = Entity::from_example("Company", &props).unwrap();
        assert_eq!(entity.values("country"), ["de"]);
    }

    #[test]
    fn example_combines_name_parts() {
        let props = BTreeMap::from([
            ("firstName".to_string(), json!(["Sergei"])),
            ("lastName".to_string(), json!(["Ivanov"])),
        ]);
        let entity = Entity::from_example("Person", &props).unwrap();
        assert_eq!(entity.names(), vec!["Sergei Ivanov"]);
    }

    #[test]
    fn typed_values_respect_matchable() {
        let entity = Entity::from_value(json!({
            "id": "e1",
            "schema": "Person",
            "properties": {"name": ["A"], "weakAlias": ["B"]},
        }))
        .unwrap();
        assert_eq!(entity.typed_values(PropType::Name, true), vec!["A"]);
        assert_eq!(entity.names(), vec!["A", "B"]);
    }
}
