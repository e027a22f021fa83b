//! In-memory implementation of the provider.
//!
//! Useful for tests and ephemeral setups. It stores documents in plain
//! maps and interprets the query subset the builders in this crate emit:
//! `bool`, `term`, `terms`, `ids`, `match`, `match_phrase`,
//! `match_phrase_prefix`, `match_all`, `match_none`, `range`, and
//! `query_string`. Scoring is clause counting weighted by boosts, which
//! preserves the ordering properties the service relies on.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::IndexError;
use crate::provider::{BulkOp, Hit, SearchOpts, SearchProvider, SearchResponse, Total};

#[derive(Default)]
struct IndexState {
    /// Document id to (insertion sequence, body).
    docs: HashMap<String, (u64, Value)>,
    next_seq: u64,
}

#[derive(Default)]
struct MemoryState {
    indices: HashMap<String, IndexState>,
    aliases: HashMap<String, HashSet<String>>,
}

/// Provider over process-local maps.
#[derive(Default)]
pub struct MemoryProvider {
    state: RwLock<MemoryState>,
}

impl MemoryProvider {
    pub fn new() -> MemoryProvider {
        MemoryProvider::default()
    }

    /// Number of documents in one concrete index.
    pub fn doc_count(&self, index: &str) -> usize {
        let state = self.state.read().expect("memory provider poisoned");
        state.indices.get(index).map(|idx| idx.docs.len()).unwrap_or(0)
    }

    fn resolve(&self, state: &MemoryState, name: &str) -> Result<Vec<String>, IndexError> {
        if let Some(members) = state.aliases.get(name) {
            let mut members: Vec<String> = members.iter().cloned().collect();
            members.sort();
            return Ok(members);
        }
        if state.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        Err(IndexError::IndexNotReady(format!("no such index: {name}")))
    }
}

#[async_trait]
impl SearchProvider for MemoryProvider {
    async fn check_health(&self) -> bool {
        true
    }

    async fn refresh(&self, _index: &str) -> Result<(), IndexError> {
        Ok(())
    }

    async fn all_indices(&self) -> Result<Vec<String>, IndexError> {
        let state = self.state.read().expect("memory provider poisoned");
        let mut names: Vec<String> = state.indices.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, IndexError> {
        let state = self.state.read().expect("memory provider poisoned");
        let mut members: Vec<String> = state
            .aliases
            .get(alias)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn rollover_index(
        &self,
        alias: &str,
        next_index: &str,
        prefix: &str,
    ) -> Result<(), IndexError> {
        let mut state = self.state.write().expect("memory provider poisoned");
        if !state.indices.contains_key(next_index) {
            return Err(IndexError::NotFound(format!("no such index: {next_index}")));
        }
        let members = state.aliases.entry(alias.to_string()).or_default();
        members.retain(|name| !name.starts_with(prefix));
        members.insert(next_index.to_string());
        Ok(())
    }

    async fn clone_index(&self, base: &str, target: &str) -> Result<(), IndexError> {
        if base == target {
            return Err(IndexError::invalid("cannot clone an index to itself"));
        }
        let mut state = self.state.write().expect("memory provider poisoned");
        let cloned = {
            let source = state
                .indices
                .get(base)
                .ok_or_else(|| IndexError::NotFound(format!("no such index: {base}")))?;
            IndexState { docs: source.docs.clone(), next_seq: source.next_seq }
        };
        state.indices.insert(target.to_string(), cloned);
        Ok(())
    }

    async fn create_index(
        &self,
        index: &str,
        _mappings: Value,
        _settings: Value,
    ) -> Result<(), IndexError> {
        let mut state = self.state.write().expect("memory provider poisoned");
        state.indices.entry(index.to_string()).or_default();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        let mut state = self.state.write().expect("memory provider poisoned");
        state.indices.remove(index);
        for members in state.aliases.values_mut() {
            members.remove(index);
        }
        Ok(())
    }

    async fn exists_index_alias(&self, alias: &str, index: &str) -> Result<bool, IndexError> {
        let state = self.state.read().expect("memory provider poisoned");
        Ok(state
            .aliases
            .get(alias)
            .map(|members| members.contains(index))
            .unwrap_or(false))
    }

    async fn search(
        &self,
        index: &str,
        query: Value,
        opts: SearchOpts,
    ) -> Result<SearchResponse, IndexError> {
        let state = self.state.read().expect("memory provider poisoned");
        let members = self.resolve(&state, index)?;

        let mut matched: Vec<(String, u64, f64, Value)> = Vec::new();
        for member in &members {
            let Some(idx) = state.indices.get(member) else { continue };
            for (id, (seq, doc)) in &idx.docs {
                let mut scoped = doc.clone();
                scoped["_id"] = json!(id);
                if let Some(score) = eval_query(&query, &scoped)? {
                    matched.push((id.clone(), *seq, score, doc.clone()));
                }
            }
        }

        let aggregations = opts
            .aggregations
            .as_ref()
            .map(|aggs| compute_aggregations(aggs, &matched));

        sort_hits(&mut matched, &opts.sort);
        let total = matched.len() as u64;
        let from = opts.from.unwrap_or(0);
        let size = opts.size.unwrap_or(10);
        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, _, score, source)| Hit { id, score: Some(score), source })
            .collect();

        Ok(SearchResponse {
            hits,
            total: Total::eq(total),
            aggregations,
            took_ms: 0,
        })
    }

    async fn bulk_index(&self, ops: Vec<BulkOp>) -> Result<(), IndexError> {
        let mut state = self.state.write().expect("memory provider poisoned");
        for op in ops {
            match op {
                BulkOp::Index { index, id, doc } => {
                    let idx = state.indices.entry(index).or_default();
                    let seq = idx.next_seq;
                    idx.next_seq += 1;
                    idx.docs.insert(id, (seq, doc));
                }
                BulkOp::Update { index, id, doc } => {
                    let idx = state
                        .indices
                        .get_mut(&index)
                        .ok_or_else(|| IndexError::NotFound(format!("no such index: {index}")))?;
                    let (_, existing) = idx
                        .docs
                        .get_mut(&id)
                        .ok_or_else(|| IndexError::NotFound(format!("no such document: {id}")))?;
                    if let (Some(target), Some(patch)) = (existing.as_object_mut(), doc.as_object())
                    {
                        for (key, value) in patch {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                }
                BulkOp::Delete { index, id } => {
                    if let Some(idx) = state.indices.get_mut(&index) {
                        idx.docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Evaluate a query against a document, returning its score or `None`.
fn eval_query(query: &Value, doc: &Value) -> Result<Option<f64>, IndexError> {
    let obj = query
        .as_object()
        .ok_or_else(|| IndexError::invalid("query must be an object"))?;
    let (kind, body) = obj
        .iter()
        .next()
        .ok_or_else(|| IndexError::invalid("empty query"))?;

    match kind.as_str() {
        "match_all" => Ok(Some(1.0)),
        "match_none" => Ok(None),
        "bool" => eval_bool(body, doc),
        "term" => Ok(eval_term(body, doc)),
        "terms" => Ok(eval_terms(body, doc)),
        "ids" => Ok(eval_ids(body, doc)),
        "match" => Ok(eval_match(body, doc)),
        "match_phrase" => Ok(eval_phrase(body, doc, false)),
        "match_phrase_prefix" => Ok(eval_phrase(body, doc, true)),
        "range" => Ok(eval_range(body, doc)),
        "query_string" => eval_query_string(body, doc),
        other => Err(IndexError::invalid(format!("unsupported query: {other}"))),
    }
}

fn eval_bool(body: &Value, doc: &Value) -> Result<Option<f64>, IndexError> {
    let clause_list = |key: &str| -> Vec<Value> {
        match body.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(single @ Value::Object(_)) => vec![single.clone()],
            _ => Vec::new(),
        }
    };

    for clause in clause_list("filter") {
        if eval_query(&clause, doc)?.is_none() {
            return Ok(None);
        }
    }
    for clause in clause_list("must_not") {
        if eval_query(&clause, doc)?.is_some() {
            return Ok(None);
        }
    }

    let mut score = 0.0;
    for clause in clause_list("must") {
        match eval_query(&clause, doc)? {
            Some(clause_score) => score += clause_score,
            None => return Ok(None),
        }
    }

    let shoulds = clause_list("should");
    let mut should_matches = 0usize;
    for clause in &shoulds {
        if let Some(clause_score) = eval_query(clause, doc)? {
            should_matches += 1;
            score += clause_score;
        }
    }
    let minimum = body.get("minimum_should_match").and_then(Value::as_u64).unwrap_or(0) as usize;
    if !shoulds.is_empty() && should_matches < minimum {
        return Ok(None);
    }
    Ok(Some(score))
}

/// Collect the string forms of a document field's values.
fn field_values(doc: &Value, field: &str) -> Vec<String> {
    match doc.get(field) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Bool(b)) => vec![b.to_string()],
        Some(Value::Number(n)) => vec![n.to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_term(body: &Value, doc: &Value) -> Option<f64> {
    let (field, spec) = body.as_object()?.iter().next()?;
    let (value, boost) = match spec {
        Value::Object(spec) => (
            value_as_string(spec.get("value")?),
            spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0),
        ),
        other => (value_as_string(other), 1.0),
    };
    let needle = value.to_lowercase();
    field_values(doc, field)
        .iter()
        .any(|v| v.to_lowercase() == needle)
        .then_some(boost)
}

fn eval_terms(body: &Value, doc: &Value) -> Option<f64> {
    let (field, values) = body.as_object()?.iter().find(|(k, _)| *k != "boost")?;
    let needles: Vec<String> = values
        .as_array()?
        .iter()
        .map(|v| value_as_string(v).to_lowercase())
        .collect();
    field_values(doc, field)
        .iter()
        .any(|v| needles.contains(&v.to_lowercase()))
        .then_some(1.0)
}

fn eval_ids(body: &Value, doc: &Value) -> Option<f64> {
    let values = body.get("values")?.as_array()?;
    let id = doc.get("_id")?.as_str()?;
    values
        .iter()
        .any(|v| v.as_str() == Some(id))
        .then_some(1.0)
}

fn eval_match(body: &Value, doc: &Value) -> Option<f64> {
    let (field, spec) = body.as_object()?.iter().next()?;
    let (query, boost, operator) = match spec {
        Value::Object(spec) => (
            value_as_string(spec.get("query")?),
            spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0),
            spec.get("operator").and_then(Value::as_str).unwrap_or("OR").to_uppercase(),
        ),
        other => (value_as_string(other), 1.0, "OR".to_string()),
    };
    let haystack = field_values(doc, field).join(" ").to_lowercase();
    let tokens: Vec<&str> = haystack.split_whitespace().collect();
    let query = query.to_lowercase();
    let wanted: Vec<&str> = query.split_whitespace().collect();
    if wanted.is_empty() {
        return None;
    }
    let found = wanted.iter().filter(|w| tokens.contains(*w)).count();
    let matched = if operator == "AND" { found == wanted.len() } else { found > 0 };
    matched.then(|| boost * found as f64)
}

fn eval_phrase(body: &Value, doc: &Value, prefix: bool) -> Option<f64> {
    let (field, spec) = body.as_object()?.iter().next()?;
    let query = match spec {
        Value::Object(spec) => value_as_string(spec.get("query")?),
        other => value_as_string(other),
    };
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let matched = field_values(doc, field).iter().any(|value| {
        let value = value.to_lowercase();
        if prefix {
            value.starts_with(&needle) || value.contains(&format!(" {needle}"))
        } else {
            value.contains(&needle)
        }
    });
    matched.then_some(1.0)
}

fn eval_range(body: &Value, doc: &Value) -> Option<f64> {
    let (field, spec) = body.as_object()?.iter().next()?;
    let spec = spec.as_object()?;
    let values = field_values(doc, field);
    let max = values.iter().max()?;
    if let Some(gt) = spec.get("gt") {
        if max.as_str() <= value_as_string(gt).as_str() {
            return None;
        }
    }
    if let Some(gte) = spec.get("gte") {
        if max.as_str() < value_as_string(gte).as_str() {
            return None;
        }
    }
    Some(1.0)
}

fn eval_query_string(body: &Value, doc: &Value) -> Result<Option<f64>, IndexError> {
    let query = body
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| IndexError::invalid("query_string without query"))?;
    if query.matches('"').count() % 2 != 0 {
        return Err(IndexError::invalid("unbalanced quotes in query string"));
    }
    let fields: Vec<String> = body
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(|field| field.split('^').next().unwrap_or(field).to_string())
                .collect()
        })
        .unwrap_or_else(|| vec!["text".to_string()]);

    let mut haystack = String::new();
    for field in &fields {
        haystack.push_str(&field_values(doc, field).join(" "));
        haystack.push(' ');
    }
    let haystack = haystack.to_lowercase();
    let tokens: Vec<&str> = haystack.split_whitespace().collect();
    let query = query.to_lowercase().replace('"', " ");
    let wanted: Vec<&str> = query.split_whitespace().collect();
    if wanted.is_empty() {
        return Ok(Some(1.0));
    }
    let operator = body
        .get("default_operator")
        .and_then(Value::as_str)
        .unwrap_or("or")
        .to_lowercase();
    let found = wanted.iter().filter(|w| tokens.contains(*w)).count();
    let matched = if operator == "and" { found == wanted.len() } else { found > 0 };
    Ok(matched.then(|| found as f64))
}

fn sort_hits(matched: &mut [(String, u64, f64, Value)], sorts: &[Value]) {
    matched.sort_by(|a, b| {
        for sort in sorts {
            match sort {
                Value::String(_) => {
                    // "_score"
                    if let Some(ord) = b.2.partial_cmp(&a.2) {
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                }
                Value::Object(spec) => {
                    if let Some((field, options)) = spec.iter().next() {
                        let desc = options
                            .get("order")
                            .and_then(Value::as_str)
                            .map(|order| order == "desc")
                            .unwrap_or(false);
                        let left = field_sort_key(&a.3, field);
                        let right = field_sort_key(&b.3, field);
                        let ord = match (left, right) {
                            (Some(l), Some(r)) => {
                                if desc {
                                    r.cmp(&l)
                                } else {
                                    l.cmp(&r)
                                }
                            }
                            // Missing values sort last either way.
                            (Some(_), None) => std::cmp::Ordering::Less,
                            (None, Some(_)) => std::cmp::Ordering::Greater,
                            (None, None) => std::cmp::Ordering::Equal,
                        };
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                }
                _ => {}
            }
        }
        if sorts.is_empty() {
            if let Some(ord) = b.2.partial_cmp(&a.2) {
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
        }
        // Stable fallback: newest insertion first for timestamped logs,
        // then id.
        b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
    });
}

/// Sortable key for a field: zero-padded numerics so that epoch millis
/// compare correctly as strings.
fn field_sort_key(doc: &Value, field: &str) -> Option<String> {
    let values = field_values(doc, field);
    let value = values.first()?;
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{value:0>20}"));
    }
    Some(value.clone())
}

fn compute_aggregations(aggs: &Value, matched: &[(String, u64, f64, Value)]) -> Value {
    let mut out = Map::new();
    let Some(aggs) = aggs.as_object() else { return Value::Object(out) };
    for (name, spec) in aggs {
        let Some(field) = spec["terms"]["field"].as_str() else { continue };
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (_, _, _, doc) in matched {
            for value in field_values(doc, field) {
                *counts.entry(value).or_default() += 1;
            }
        }
        let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let buckets: Vec<Value> = buckets
            .into_iter()
            .map(|(key, count)| json!({"key": key, "doc_count": count}))
            .collect();
        out.insert(name.clone(), json!({"buckets": buckets}));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider
            .bulk_index(vec![
                BulkOp::Index {
                    index: "idx".into(),
                    id: "a".into(),
                    doc: json!({"schema": "Person", "names": ["Vladimir Putin"], "countries": ["ru"], "timestamp": 100}),
                },
                BulkOp::Index {
                    index: "idx".into(),
                    id: "b".into(),
                    doc: json!({"schema": "Company", "names": ["Gazprom Bank"], "countries": ["ru"], "timestamp": 200}),
                },
            ])
            .await
            .unwrap();
        provider
    }

    #[tokio::test]
    async fn term_and_match_queries() {
        let provider = seeded().await;
        let resp = provider
            .search("idx", json!({"term": {"schema": {"value": "Person"}}}), SearchOpts::default())
            .await
            .unwrap();
        assert_eq!(resp.total.value, 1);
        assert_eq!(resp.hits[0].id, "a");

        let resp = provider
            .search(
                "idx",
                json!({"match": {"names": {"query": "putin", "operator": "AND"}}}),
                SearchOpts::default(),
            )
            .await
            .unwrap();
        assert_eq!(resp.total.value, 1);
    }

    #[tokio::test]
    async fn bool_filters_and_must_not() {
        let provider = seeded().await;
        let query = json!({
            "bool": {
                "filter": [{"term": {"countries": "ru"}}],
                "should": [{"match": {"names": "gazprom"}}],
                "must_not": [{"ids": {"values": ["a"]}}],
                "minimum_should_match": 1,
            }
        });
        let resp = provider.search("idx", query, SearchOpts::default()).await.unwrap();
        assert_eq!(resp.total.value, 1);
        assert_eq!(resp.hits[0].id, "b");
    }

    #[tokio::test]
    async fn sorts_by_field_desc() {
        let provider = seeded().await;
        let opts = SearchOpts {
            sort: vec![json!({"timestamp": {"order": "desc"}})],
            ..SearchOpts::default()
        };
        let resp = provider.search("idx", json!({"match_all": {}}), opts).await.unwrap();
        assert_eq!(resp.hits[0].id, "b");
    }

    #[tokio::test]
    async fn alias_rollover_swaps_members() {
        let provider = MemoryProvider::new();
        provider.create_index("ds-v1", json!({}), json!({})).await.unwrap();
        provider.create_index("ds-v2", json!({}), json!({})).await.unwrap();
        provider.create_index("other-v1", json!({}), json!({})).await.unwrap();
        provider.rollover_index("alias", "ds-v1", "ds-").await.unwrap();
        provider.rollover_index("alias", "other-v1", "other-").await.unwrap();
        provider.rollover_index("alias", "ds-v2", "ds-").await.unwrap();
        let members = provider.alias_indices("alias").await.unwrap();
        // The sibling with the same prefix is replaced, the other dataset
        // keeps its member.
        assert_eq!(members, vec!["ds-v2".to_string(), "other-v1".to_string()]);
    }

    #[tokio::test]
    async fn searching_missing_index_is_not_ready() {
        let provider = MemoryProvider::new();
        let err = provider
            .search("nope", json!({"match_all": {}}), SearchOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::IndexNotReady(_)));
    }

    #[tokio::test]
    async fn unbalanced_query_string_is_invalid() {
        let provider = seeded().await;
        let err = provider
            .search("idx", json!({"query_string": {"query": "\"broken"}}), SearchOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Invalid(_)));
    }
}
