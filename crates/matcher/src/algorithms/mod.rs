//! The enabled scoring algorithms.
//!
//! An algorithm is a pure function of two entities and a scoring config.
//! The enabled set is enumerated here; asking for anything else is a
//! client error, which keeps experimental comparators from being invoked
//! in production by a typo.

mod logic;
mod name_based;

use model::Entity;

use crate::types::{AlgorithmDoc, MatchError, Scoring, ScoringConfig};

pub use logic::LogicV1;
pub use name_based::NameBased;

/// The algorithm used when a request names none.
pub const DEFAULT_ALGORITHM: &str = "logic-v1";

/// A comparison algorithm scoring a candidate against a query example.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &'static str;
    /// Feature and weight documentation, served with match responses.
    fn explain(&self) -> AlgorithmDoc;
    fn compare(&self, query: &Entity, candidate: &Entity, config: &ScoringConfig) -> Scoring;
}

static ALGORITHMS: &[&dyn Algorithm] = &[&NameBased, &LogicV1];

/// Look up an enabled algorithm by name.
pub fn get_algorithm(name: &str) -> Result<&'static dyn Algorithm, MatchError> {
    ALGORITHMS
        .iter()
        .find(|algorithm| algorithm.name() == name)
        .copied()
        .ok_or_else(|| MatchError::InvalidAlgorithm(name.to_string()))
}

/// Names of every enabled algorithm.
pub fn algorithm_names() -> Vec<&'static str> {
    ALGORITHMS.iter().map(|algorithm| algorithm.name()).collect()
}

/// Shared helpers for the comparators.
pub(crate) mod features {
    use model::{Entity, PropType};
    use names::{analyze_name, comparison_form};
    use strsim::jaro_winkler;

    /// Best pairwise similarity between the two entities' normalized names.
    pub fn name_similarity(query: &Entity, candidate: &Entity) -> f64 {
        let query_names: Vec<String> =
            query.names().iter().map(|name| comparison_form(name)).collect();
        let candidate_names: Vec<String> =
            candidate.names().iter().map(|name| comparison_form(name)).collect();
        let mut best: f64 = 0.0;
        for q in &query_names {
            for c in &candidate_names {
                if q.is_empty() || c.is_empty() {
                    continue;
                }
                best = best.max(jaro_winkler(q, c));
            }
        }
        best
    }

    fn name_tokens(entity: &Entity, phonetic: bool) -> Vec<String> {
        let kind = entity.schema().name_kind;
        let mut out = Vec::new();
        for name in entity.names() {
            let analyzed = analyze_name(name, kind);
            for part in &analyzed.parts {
                let token = if phonetic {
                    match &part.phonetic {
                        Some(code) => code.clone(),
                        None => continue,
                    }
                } else {
                    part.text.clone()
                };
                if !out.contains(&token) {
                    out.push(token);
                }
            }
        }
        out
    }

    fn jaccard(left: &[String], right: &[String]) -> f64 {
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }
        let shared = left.iter().filter(|token| right.contains(token)).count();
        let union = left.len() + right.len() - shared;
        shared as f64 / union as f64
    }

    /// Token overlap between the name part sets.
    pub fn part_overlap(query: &Entity, candidate: &Entity) -> f64 {
        jaccard(&name_tokens(query, false), &name_tokens(candidate, false))
    }

    /// Overlap between the phonetic code sets.
    pub fn phonetic_overlap(query: &Entity, candidate: &Entity) -> f64 {
        jaccard(&name_tokens(query, true), &name_tokens(candidate, true))
    }

    /// Overlap between matchable name symbols (legal forms, synonym
    /// classes, known given names).
    pub fn symbol_overlap(query: &Entity, candidate: &Entity) -> f64 {
        let collect = |entity: &Entity| -> Vec<String> {
            let kind = entity.schema().name_kind;
            let mut out = Vec::new();
            for name in entity.names() {
                for symbol in analyze_name(name, kind).matchable_symbols() {
                    let rendered = symbol.to_string();
                    if !out.contains(&rendered) {
                        out.push(rendered);
                    }
                }
            }
            out
        };
        jaccard(&collect(query), &collect(candidate))
    }

    /// Whether any country values agree.
    pub fn country_match(query: &Entity, candidate: &Entity) -> Option<bool> {
        let query_countries = query.typed_values(PropType::Country, false);
        let candidate_countries = candidate.typed_values(PropType::Country, false);
        if query_countries.is_empty() || candidate_countries.is_empty() {
            return None;
        }
        Some(query_countries.iter().any(|c| candidate_countries.contains(c)))
    }

    /// Date agreement at the precision of the less precise side:
    /// `Some(true)` when one value prefixes the other.
    pub fn date_match(query: &Entity, candidate: &Entity) -> Option<bool> {
        let query_dates = query.typed_values(PropType::Date, true);
        let candidate_dates = candidate.typed_values(PropType::Date, true);
        if query_dates.is_empty() || candidate_dates.is_empty() {
            return None;
        }
        let agree = query_dates.iter().any(|q| {
            candidate_dates
                .iter()
                .any(|c| q.starts_with(c) || c.starts_with(q))
        });
        Some(agree)
    }

    fn normalize_identifier(value: &str) -> String {
        value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    }

    /// Whether any identifier values agree after normalization.
    pub fn identifier_match(query: &Entity, candidate: &Entity) -> Option<bool> {
        let query_ids: Vec<String> = query
            .typed_values(PropType::Identifier, false)
            .iter()
            .map(|v| normalize_identifier(v))
            .collect();
        let candidate_ids: Vec<String> = candidate
            .typed_values(PropType::Identifier, false)
            .iter()
            .map(|v| normalize_identifier(v))
            .collect();
        if query_ids.is_empty() || candidate_ids.is_empty() {
            return None;
        }
        Some(query_ids.iter().any(|id| candidate_ids.contains(id)))
    }

    /// Whether the gender values disagree.
    pub fn gender_mismatch(query: &Entity, candidate: &Entity) -> bool {
        let query_gender = query.typed_values(PropType::Gender, false);
        let candidate_gender = candidate.typed_values(PropType::Gender, false);
        match (query_gender.first(), candidate_gender.first()) {
            (Some(q), Some(c)) => !q.eq_ignore_ascii_case(c),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_serves_enabled_algorithms() {
        assert!(get_algorithm("name-based").is_ok());
        assert!(get_algorithm("logic-v1").is_ok());
        assert!(matches!(
            get_algorithm("neural-net"),
            Err(MatchError::InvalidAlgorithm(_))
        ));
        assert_eq!(algorithm_names(), vec!["name-based", "logic-v1"]);
    }
}
