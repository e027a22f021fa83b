//! Entity index mapping and document synthesis.
//!
//! The stored document is the entity body verbatim plus synthesized sidecar
//! fields: searchable name text, name parts, phonetic codes, symbols, the
//! per-type group copies, and a free-text catch-all. Serving reads the body
//! back directly and never re-synthesizes.

use serde_json::{json, Map, Value};

use model::{schema, Entity, PropType};
use names::{analyze_name, expand_dates};

/// Shared analysis settings: keyword fields are lowercased and folded, text
/// fields use the standard tokenizer with the same filters.
pub fn index_settings(shards: u32) -> Value {
    json!({
        "analysis": {
            "normalizer": {
                "scr-normalizer": {"type": "custom", "filter": ["lowercase", "asciifolding"]}
            },
            "analyzer": {
                "scr-analyzer": {"tokenizer": "standard", "filter": ["lowercase", "asciifolding"]}
            }
        },
        "index": {
            "refresh_interval": "5s",
            "auto_expand_replicas": "0-all",
            "number_of_shards": shards,
        }
    })
}

const DATE_FORMAT: &str =
    "yyyy-MM-dd'T'HH:mm:ss||yyyy-MM-dd'T'HH:mm||yyyy-MM-dd||yyyy-MM||yyyy";

fn keyword() -> Value {
    json!({"type": "keyword", "normalizer": "scr-normalizer"})
}

fn text() -> Value {
    json!({"type": "text", "analyzer": "scr-analyzer"})
}

fn group_field(group: &str) -> Value {
    match group {
        "names" | "addresses" => text(),
        _ => keyword(),
    }
}

/// Build the mapping for an entity index, covering every property declared
/// anywhere in the schema taxonomy.
pub fn entity_mapping() -> Value {
    let mut props = Map::new();
    for schema in schema::all() {
        for prop in schema.properties() {
            let field = match prop.prop_type {
                PropType::Name | PropType::Address | PropType::Text => text(),
                _ => keyword(),
            };
            props.insert(prop.name.to_string(), field);
        }
    }

    let mut mapping = Map::new();
    mapping.insert("canonical_id".into(), json!({"type": "keyword"}));
    mapping.insert("schema".into(), json!({"type": "keyword"}));
    mapping.insert("caption".into(), keyword());
    mapping.insert("datasets".into(), json!({"type": "keyword"}));
    mapping.insert("referents".into(), json!({"type": "keyword"}));
    mapping.insert("target".into(), json!({"type": "boolean"}));
    mapping.insert("text".into(), text());
    mapping.insert(
        "first_seen".into(),
        json!({"type": "date", "format": DATE_FORMAT}),
    );
    mapping.insert(
        "last_seen".into(),
        json!({"type": "date", "format": DATE_FORMAT}),
    );
    mapping.insert(
        "last_change".into(),
        json!({"type": "date", "format": DATE_FORMAT}),
    );
    mapping.insert("name_parts".into(), keyword());
    mapping.insert("name_phonetic".into(), json!({"type": "keyword"}));
    mapping.insert("name_symbols".into(), json!({"type": "keyword"}));
    for group in [
        "names", "entities", "dates", "countries", "identifiers", "phones", "emails",
        "addresses", "topics", "genders", "ibans", "urls",
    ] {
        mapping.insert(group.to_string(), group_field(group));
    }
    mapping.insert(
        "properties".into(),
        json!({"dynamic": "strict", "properties": Value::Object(props)}),
    );

    json!({"dynamic": "strict", "properties": Value::Object(mapping)})
}

/// Synthesize the index document for an entity.
pub fn build_entity_doc(entity: &Entity) -> Value {
    let schema = entity.schema();
    let mut doc = match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    // The document id carries the entity id.
    doc.remove("id");
    doc.insert("canonical_id".into(), json!(entity.id));

    let mut name_values: Vec<String> = Vec::new();
    let mut name_parts: Vec<String> = Vec::new();
    let mut name_phonetic: Vec<String> = Vec::new();
    let mut name_symbols: Vec<String> = Vec::new();
    for raw in entity.names() {
        push_unique(&mut name_values, raw.to_string());
        let analyzed = analyze_name(raw, schema.name_kind);
        for part in &analyzed.parts {
            push_unique(&mut name_parts, part.text.clone());
            if let Some(code) = &part.phonetic {
                push_unique(&mut name_phonetic, code.clone());
            }
        }
        for symbol in analyzed.matchable_symbols() {
            push_unique(&mut name_symbols, symbol.to_string());
        }
    }
    if let Some(caption) = &entity.caption {
        push_unique(&mut name_values, caption.clone());
    }

    let mut text: Vec<String> = Vec::new();
    let mut groups: Map<String, Value> = Map::new();
    for (prop_name, value) in entity.iter_values() {
        push_unique(&mut text, value.to_string());
        let Some(prop) = schema.property(prop_name) else { continue };
        let groupable = prop.matchable || prop.prop_type == PropType::Entity;
        if !groupable {
            continue;
        }
        let Some(group) = prop.prop_type.group() else { continue };
        if group == "names" {
            continue;
        }
        let slot = groups
            .entry(group.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = slot {
            let value = json!(value);
            if !items.contains(&value) {
                items.push(value);
            }
        }
    }

    // Dates are indexed with their year and year-month prefixes so partial
    // queries match precise values.
    if let Some(Value::Array(dates)) = groups.get("dates") {
        let values: Vec<String> = dates
            .iter()
            .filter_map(|d| d.as_str().map(str::to_string))
            .collect();
        groups.insert("dates".into(), json!(expand_dates(&values)));
    }

    doc.insert("names".into(), json!(name_values));
    doc.insert("name_parts".into(), json!(name_parts));
    doc.insert("name_phonetic".into(), json!(name_phonetic));
    doc.insert("name_symbols".into(), json!(name_symbols));
    doc.insert("text".into(), json!(text));
    for (group, values) in groups {
        doc.insert(group, values);
    }
    Value::Object(doc)
}

/// The stub document written under each referent id, redirecting lookups
/// to the canonical entity.
pub fn build_referent_doc(canonical_id: &str) -> Value {
    json!({"canonical_id": canonical_id})
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Entity {
        Entity::from_value(json!({
            "id": "Q7747",
            "schema": "Person",
            "properties": {
                "name": ["Vladimir Putin"],
                "birthDate": ["1952-10-07"],
                "citizenship": ["ru"],
            },
            "datasets": ["eu_fsf"],
            "referents": ["gb-hmt-14196"],
            "target": true,
        }))
        .unwrap()
    }

    #[test]
    fn doc_carries_sidecars() {
        let doc = build_entity_doc(&person());
        assert_eq!(doc["canonical_id"], "Q7747");
        assert!(doc.get("id").is_none());
        let parts: Vec<&str> = doc["name_parts"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(parts.contains(&"vladimir"));
        assert!(parts.contains(&"putin"));
        let phonetics: Vec<&str> = doc["name_phonetic"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(phonetics.contains(&"PTN"));
        let countries: Vec<&str> = doc["countries"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(countries, vec!["ru"]);
    }

    #[test]
    fn dates_are_expanded() {
        let doc = build_entity_doc(&person());
        let dates: Vec<&str> = doc["dates"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(dates.contains(&"1952-10-07"));
        assert!(dates.contains(&"1952-10"));
        assert!(dates.contains(&"1952"));
    }

    #[test]
    fn org_doc_carries_symbols() {
        let entity = Entity::from_value(json!({
            "id": "ru-gazbank",
            "schema": "Company",
            "properties": {"name": ["Gazprom Bank OOO"]},
        }))
        .unwrap();
        let doc = build_entity_doc(&entity);
        let symbols: Vec<&str> = doc["name_symbols"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(symbols.contains(&"ORGCLS:LLC"));
        assert!(symbols.contains(&"SYMBOL:BANK"));
    }

    #[test]
    fn mapping_is_strict() {
        let mapping = entity_mapping();
        assert_eq!(mapping["dynamic"], "strict");
        assert!(mapping["properties"]["name_phonetic"].is_object());
        assert!(mapping["properties"]["properties"]["properties"]["birthDate"].is_object());
    }

    #[test]
    fn referent_stub_redirects() {
        let doc = build_referent_doc("Q7747");
        assert_eq!(doc, json!({"canonical_id": "Q7747"}));
    }
}
