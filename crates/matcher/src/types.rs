use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use model::Entity;

/// Per-request scoring configuration: feature weight multipliers keyed by
/// feature name. Unknown names are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl ScoringConfig {
    /// The effective weight of a feature after overrides.
    pub fn weight(&self, feature: &str, default: f64) -> f64 {
        match self.weights.get(feature) {
            Some(multiplier) => default * multiplier,
            None => default,
        }
    }
}

/// The result of comparing a query example against one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct Scoring {
    /// Final score in `[0, 1]`.
    pub score: f64,
    /// Per-feature contributions to the score.
    pub features: BTreeMap<String, f64>,
}

/// Documentation of one scoring feature.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureDoc {
    pub description: &'static str,
    pub weight: f64,
}

/// Self-description of an algorithm, returned with every match response.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmDoc {
    pub name: &'static str,
    pub description: &'static str,
    pub features: BTreeMap<&'static str, FeatureDoc>,
}

/// A candidate with its score and the match verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntity {
    #[serde(flatten)]
    pub entity: Entity,
    pub score: f64,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub features: BTreeMap<String, f64>,
}

/// Errors of the matching layer.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The requested algorithm is unknown or not enabled.
    #[error("unknown or disabled algorithm: {0}")]
    InvalidAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_overrides_multiply() {
        let mut config = ScoringConfig::default();
        config.weights.insert("name_similarity".to_string(), 0.5);
        assert_eq!(config.weight("name_similarity", 0.8), 0.4);
        assert_eq!(config.weight("unrelated", 0.8), 0.8);
    }
}
