//! Query construction for the search backend.
//!
//! Two entry points matter: [`text_query`] backs the interactive search
//! endpoint, [`entity_query`] generates candidates for the matcher. Both
//! wrap their clauses in the same filter envelope so that every result is
//! guaranteed to satisfy the dataset scope, the schema lattice, and the
//! caller's filters.

use serde_json::{json, Value};

use model::{Dataset, Entity, PropType, Schema};
use names::{analyze_name, comparison_form, pick_names};

/// Hard ceiling on results reachable through paging.
pub const MAX_RESULTS: usize = 9999;

/// Names above this count are reduced to a representative subset before
/// query construction.
const NAME_PICK_LIMIT: usize = 30;

/// With this many distinct names or fewer, each gets its own fuzzy clause;
/// beyond it they are folded into one match to stay under the backend's
/// boolean clause limit.
const FUZZY_NAME_LIMIT: usize = 4;

/// Caller-supplied constraints shared by search and match queries.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// Per-field keyword filters: `countries`, `topics`, ...
    pub fields: Vec<(String, Vec<String>)>,
    pub include_dataset: Vec<String>,
    pub exclude_dataset: Vec<String>,
    pub exclude_schema: Vec<String>,
    /// Drops candidates whose canonical id or any referent matches.
    pub exclude_entity_ids: Vec<String>,
    /// Only entities whose `last_change` is after this timestamp.
    pub changed_since: Option<String>,
    pub target: Option<bool>,
}

/// The candidate pool size for a match query.
pub fn candidate_limit(limit: usize, multiplier: usize) -> usize {
    20.max(MAX_RESULTS.min(limit.saturating_mul(multiplier)))
}

fn dataset_scope(dataset: &Dataset, spec: &FilterSpec) -> Vec<String> {
    let scope = dataset.scope_names();
    if !spec.include_dataset.is_empty() {
        spec.include_dataset
            .iter()
            .filter(|name| scope.contains(name) && !spec.exclude_dataset.contains(name))
            .cloned()
            .collect()
    } else {
        scope
            .into_iter()
            .filter(|name| !spec.exclude_dataset.contains(name))
            .collect()
    }
}

fn filter_query(
    shoulds: Vec<Value>,
    dataset: &Dataset,
    schema: Option<&Schema>,
    spec: &FilterSpec,
) -> Value {
    let mut filters = vec![json!({"terms": {"datasets": dataset_scope(dataset, spec)}})];
    if let Some(schema) = schema {
        filters.push(json!({"terms": {"schema": schema.matchable_set()}}));
    }
    for (field, values) in &spec.fields {
        let values: Vec<&String> = values.iter().filter(|v| !v.is_empty()).collect();
        if values.len() == 1 {
            filters.push(json!({"term": {field: {"value": values[0]}}}));
        } else if !values.is_empty() {
            filters.push(json!({"terms": {field: values}}));
        }
    }
    if let Some(target) = spec.target {
        filters.push(json!({"term": {"target": {"value": target}}}));
    }
    if let Some(since) = &spec.changed_since {
        filters.push(json!({"range": {"last_change": {"gt": since}}}));
    }

    let mut must_not = Vec::new();
    if !spec.exclude_schema.is_empty() {
        must_not.push(json!({"terms": {"schema": spec.exclude_schema}}));
    }
    if !spec.exclude_entity_ids.is_empty() {
        must_not.push(json!({"ids": {"values": spec.exclude_entity_ids}}));
        must_not.push(json!({"terms": {"referents": spec.exclude_entity_ids}}));
    }

    json!({
        "bool": {
            "filter": filters,
            "should": shoulds,
            "must_not": must_not,
            "minimum_should_match": 1,
        }
    })
}

/// Build the free-text search query.
pub fn text_query(
    dataset: &Dataset,
    schema: &Schema,
    q: &str,
    spec: &FilterSpec,
    fuzzy: bool,
) -> Value {
    let should = if q.trim().is_empty() {
        json!({"match_all": {}})
    } else {
        json!({
            "query_string": {
                "query": q,
                "fields": ["names^3", "text"],
                "default_operator": "and",
                "fuzziness": if fuzzy { json!("AUTO") } else { json!(0) },
                "lenient": fuzzy,
            }
        })
    };
    filter_query(vec![should], dataset, Some(schema), spec)
}

/// Build the type-ahead prefix query.
pub fn prefix_query(dataset: &Dataset, prefix: &str) -> Value {
    let should = if prefix.trim().is_empty() {
        json!({"match_none": {}})
    } else {
        json!({"match_phrase_prefix": {"names": {"query": prefix, "slop": 2}}})
    };
    filter_query(vec![should], dataset, None, &FilterSpec::default())
}

fn names_clauses(entity: &Entity, fuzzy: bool) -> Vec<Value> {
    let names = entity.typed_values(PropType::Name, true);
    let names: Vec<String> = pick_names(&names, NAME_PICK_LIMIT);

    let mut distinct: Vec<String> = Vec::new();
    for name in &names {
        let form = comparison_form(name);
        if !form.is_empty() && !distinct.contains(&form) {
            distinct.push(form);
        }
    }

    if distinct.len() <= FUZZY_NAME_LIMIT {
        return distinct
            .iter()
            .map(|name| {
                json!({
                    "match": {
                        "names": {
                            "query": name,
                            "operator": "AND",
                            "boost": 3.0,
                            "fuzziness": if fuzzy { json!("AUTO") } else { json!(0) },
                        }
                    }
                })
            })
            .collect();
    }

    // Folding the deduplicated names into one clause keeps the query under
    // the backend's boolean clause limit; fuzziness is dropped here.
    vec![json!({
        "match": {
            "names": {
                "query": distinct.join(" "),
                "boost": 3.0,
            }
        }
    })]
}

fn name_signal_clauses(entity: &Entity) -> Vec<Value> {
    let schema = entity.schema();
    let mut parts: Vec<String> = Vec::new();
    let mut phonetics: Vec<String> = Vec::new();
    let mut symbols: Vec<String> = Vec::new();
    for raw in entity.typed_values(PropType::Name, true) {
        let analyzed = analyze_name(raw, schema.name_kind);
        for part in &analyzed.parts {
            if !parts.contains(&part.text) {
                parts.push(part.text.clone());
            }
        }
        for code in analyzed.phonetics() {
            if !phonetics.iter().any(|existing| existing == code) {
                phonetics.push(code.to_string());
            }
        }
        for symbol in analyzed.matchable_symbols() {
            let rendered = symbol.to_string();
            if !symbols.contains(&rendered) {
                symbols.push(rendered);
            }
        }
    }

    let mut clauses = Vec::new();
    for part in parts {
        clauses.push(json!({"term": {"name_parts": {"value": part, "boost": 1.0}}}));
    }
    for code in phonetics {
        clauses.push(json!({"term": {"name_phonetic": {"value": code, "boost": 0.8}}}));
    }
    for symbol in symbols {
        clauses.push(json!({"term": {"name_symbols": {"value": symbol, "boost": 2.0}}}));
    }
    clauses
}

/// Build the candidate-generation query for a match example.
pub fn entity_query(dataset: &Dataset, entity: &Entity, spec: &FilterSpec, fuzzy: bool) -> Value {
    let schema = entity.schema();
    let mut shoulds = Vec::new();

    for (prop_name, value) in entity.iter_values() {
        let Some(prop) = schema.property(prop_name) else { continue };
        if prop.prop_type == PropType::Name || !prop.matchable {
            continue;
        }
        match prop.prop_type.group() {
            Some(group) if prop.prop_type.is_text_group() => {
                shoulds.push(json!({"match": {group: {"query": value}}}));
            }
            Some(group) => {
                shoulds.push(json!({"term": {group: {"value": value}}}));
            }
            None => {
                shoulds.push(json!({"match_phrase": {"text": value}}));
            }
        }
    }

    shoulds.extend(names_clauses(entity, fuzzy));
    shoulds.extend(name_signal_clauses(entity));
    filter_query(shoulds, dataset, Some(schema), spec)
}

/// Build facet aggregations for the given fields.
pub fn facet_aggregations(fields: &[String]) -> Option<Value> {
    if fields.is_empty() {
        return None;
    }
    let mut aggs = serde_json::Map::new();
    for field in fields {
        aggs.insert(field.clone(), json!({"terms": {"field": field, "size": 1000}}));
    }
    Some(Value::Object(aggs))
}

/// Parse `field:asc|desc` sort expressions, always appending `_score`.
/// Documents missing a sort field go last.
pub fn parse_sorts(sorts: &[String]) -> Vec<Value> {
    let mut out = Vec::new();
    for sort in sorts {
        let (field, order) = match sort.rsplit_once(':') {
            Some((field, order)) if order == "asc" || order == "desc" => (field, order),
            _ => (sort.as_str(), "asc"),
        };
        out.push(json!({field: {"order": order, "missing": "_last"}}));
    }
    out.push(json!("_score"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn dataset() -> Dataset {
        let mut ds = Dataset::new("default");
        ds.children = vec!["eu_fsf".into(), "us_ofac".into()];
        ds
    }

    fn example() -> Entity {
        let props = BTreeMap::from([
            ("name".to_string(), json!(["Vladimir Putin"])),
            ("birthDate".to_string(), json!(["1952"])),
            ("country".to_string(), json!(["ru"])),
        ]);
        Entity::from_example("Person", &props).unwrap()
    }

    fn clauses(query: &Value, section: &str) -> Vec<Value> {
        query["bool"][section].as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn entity_query_has_name_and_typed_clauses() {
        let query = entity_query(&dataset(), &example(), &FilterSpec::default(), true);
        let shoulds = clauses(&query, "should");
        assert!(shoulds.iter().any(|c| c["match"]["names"]["query"] == "vladimir putin"
            && c["match"]["names"]["fuzziness"] == "AUTO"));
        assert!(shoulds.iter().any(|c| c["term"]["dates"]["value"] == "1952"));
        assert!(shoulds.iter().any(|c| c["term"]["countries"]["value"] == "ru"));
        assert!(shoulds.iter().any(|c| c["term"]["name_parts"]["value"] == "putin"));
        assert!(shoulds.iter().any(|c| c["term"]["name_phonetic"]["value"] == "PTN"));
    }

    #[test]
    fn entity_query_filters_schema_lattice() {
        let query = entity_query(&dataset(), &example(), &FilterSpec::default(), false);
        let filters = clauses(&query, "filter");
        assert!(filters.iter().any(|f| f["terms"]["schema"] == json!(["Person", "LegalEntity"])));
        assert_eq!(query["bool"]["minimum_should_match"], 1);
    }

    #[test]
    fn many_names_fold_into_one_clause() {
        let names: Vec<String> = (0..8).map(|i| format!("Alias Number {i}")).collect();
        let props = BTreeMap::from([("name".to_string(), json!(names))]);
        let entity = Entity::from_example("Person", &props).unwrap();
        let query = entity_query(&dataset(), &entity, &FilterSpec::default(), true);
        let shoulds = clauses(&query, "should");
        let name_matches: Vec<&Value> = shoulds
            .iter()
            .filter(|c| c["match"]["names"].is_object())
            .collect();
        assert_eq!(name_matches.len(), 1);
        assert!(name_matches[0]["match"]["names"]["fuzziness"].is_null());
    }

    #[test]
    fn excluded_ids_hit_referents_too() {
        let spec = FilterSpec {
            exclude_entity_ids: vec!["gb-hmt-14196".into()],
            ..FilterSpec::default()
        };
        let query = entity_query(&dataset(), &example(), &spec, false);
        let must_not = clauses(&query, "must_not");
        assert!(must_not.iter().any(|c| c["ids"]["values"] == json!(["gb-hmt-14196"])));
        assert!(must_not.iter().any(|c| c["terms"]["referents"] == json!(["gb-hmt-14196"])));
    }

    #[test]
    fn include_datasets_narrow_the_scope() {
        let spec = FilterSpec {
            include_dataset: vec!["eu_fsf".into(), "elsewhere".into()],
            ..FilterSpec::default()
        };
        let query = text_query(&dataset(), model::schema::get("Thing").unwrap(), "x", &spec, false);
        let filters = clauses(&query, "filter");
        assert!(filters.iter().any(|f| f["terms"]["datasets"] == json!(["eu_fsf"])));
    }

    #[test]
    fn exclude_dataset_removes_from_scope() {
        let spec = FilterSpec {
            exclude_dataset: vec!["eu_fsf".into()],
            ..FilterSpec::default()
        };
        let query = text_query(&dataset(), model::schema::get("Thing").unwrap(), "x", &spec, false);
        let filters = clauses(&query, "filter");
        let datasets = &filters.iter().find(|f| f["terms"]["datasets"].is_array()).unwrap()["terms"]["datasets"];
        assert!(!datasets.as_array().unwrap().contains(&json!("eu_fsf")));
    }

    #[test]
    fn text_query_uses_query_string() {
        let query = text_query(
            &dataset(),
            model::schema::get("Thing").unwrap(),
            "vladimir putin",
            &FilterSpec::default(),
            false,
        );
        let shoulds = clauses(&query, "should");
        assert_eq!(shoulds[0]["query_string"]["default_operator"], "and");
        assert_eq!(shoulds[0]["query_string"]["fields"], json!(["names^3", "text"]));
    }

    #[test]
    fn empty_text_matches_all() {
        let query = text_query(
            &dataset(),
            model::schema::get("Thing").unwrap(),
            "  ",
            &FilterSpec::default(),
            false,
        );
        assert!(clauses(&query, "should")[0]["match_all"].is_object());
    }

    #[test]
    fn candidate_pool_bounds() {
        assert_eq!(candidate_limit(1, 10), 20);
        assert_eq!(candidate_limit(5, 10), 50);
        assert_eq!(candidate_limit(5000, 10), MAX_RESULTS);
    }

    #[test]
    fn sort_parsing() {
        let sorts = parse_sorts(&["first_seen:desc".to_string(), "caption".to_string()]);
        assert_eq!(sorts[0], json!({"first_seen": {"order": "desc", "missing": "_last"}}));
        assert_eq!(sorts[1], json!({"caption": {"order": "asc", "missing": "_last"}}));
        assert_eq!(sorts[2], json!("_score"));
    }
}
