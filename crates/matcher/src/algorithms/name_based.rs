//! Name-only comparison.

use std::collections::BTreeMap;

use model::Entity;

use super::features;
use super::Algorithm;
use crate::types::{AlgorithmDoc, FeatureDoc, Scoring, ScoringConfig};

const W_SIMILARITY: f64 = 0.7;
const W_PARTS: f64 = 0.15;
const W_PHONETIC: f64 = 0.1;
const W_SYMBOLS: f64 = 0.05;

/// Scores candidates purely on how well their names agree with the query,
/// ignoring every other property. Useful as a recall-heavy baseline and
/// for callers that only hold a name.
pub struct NameBased;

impl Algorithm for NameBased {
    fn name(&self) -> &'static str {
        "name-based"
    }

    fn explain(&self) -> AlgorithmDoc {
        AlgorithmDoc {
            name: self.name(),
            description: "Comparison of entity names only, combining string \
                          similarity, token overlap, phonetics, and name symbols.",
            features: BTreeMap::from([
                (
                    "name_similarity",
                    FeatureDoc {
                        description: "Best Jaro-Winkler similarity across name pairs",
                        weight: W_SIMILARITY,
                    },
                ),
                (
                    "name_part_overlap",
                    FeatureDoc {
                        description: "Jaccard overlap of name tokens",
                        weight: W_PARTS,
                    },
                ),
                (
                    "phonetic_match",
                    FeatureDoc {
                        description: "Jaccard overlap of phonetic token codes",
                        weight: W_PHONETIC,
                    },
                ),
                (
                    "symbol_overlap",
                    FeatureDoc {
                        description: "Jaccard overlap of name symbols",
                        weight: W_SYMBOLS,
                    },
                ),
            ]),
        }
    }

    fn compare(&self, query: &Entity, candidate: &Entity, config: &ScoringConfig) -> Scoring {
        let mut features = BTreeMap::new();
        let mut score = 0.0;
        for (name, weight, value) in [
            ("name_similarity", W_SIMILARITY, features::name_similarity(query, candidate)),
            ("name_part_overlap", W_PARTS, features::part_overlap(query, candidate)),
            ("phonetic_match", W_PHONETIC, features::phonetic_overlap(query, candidate)),
            ("symbol_overlap", W_SYMBOLS, features::symbol_overlap(query, candidate)),
        ] {
            let contribution = config.weight(name, weight) * value;
            if value > 0.0 {
                features.insert(name.to_string(), contribution);
            }
            score += contribution;
        }
        Scoring { score: score.clamp(0.0, 1.0), features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: &str, schema: &str, name: &str) -> Entity {
        Entity::from_value(json!({
            "id": id,
            "schema": schema,
            "properties": {"name": [name]},
        }))
        .unwrap()
    }

    #[test]
    fn identical_names_score_high() {
        let query = entity("q", "Person", "Vladimir Putin");
        let candidate = entity("c", "Person", "Vladimir Putin");
        let scoring = NameBased.compare(&query, &candidate, &ScoringConfig::default());
        assert!(scoring.score > 0.95, "score was {}", scoring.score);
        assert!(scoring.features.contains_key("name_similarity"));
    }

    #[test]
    fn transliteration_variants_still_match() {
        let query = entity("q", "Person", "Wladimir Putin");
        let candidate = entity("c", "Person", "Vladimir Putin");
        let scoring = NameBased.compare(&query, &candidate, &ScoringConfig::default());
        assert!(scoring.score > 0.7, "score was {}", scoring.score);
    }

    #[test]
    fn unrelated_names_score_low() {
        let query = entity("q", "Person", "John Smith");
        let candidate = entity("c", "Person", "Acme Widgets");
        let scoring = NameBased.compare(&query, &candidate, &ScoringConfig::default());
        assert!(scoring.score < 0.5, "score was {}", scoring.score);
    }

    #[test]
    fn weight_override_reduces_score() {
        let query = entity("q", "Person", "Vladimir Putin");
        let candidate = entity("c", "Person", "Vladimir Putin");
        let mut config = ScoringConfig::default();
        config.weights.insert("name_similarity".to_string(), 0.0);
        let scoring = NameBased.compare(&query, &candidate, &config);
        assert!(scoring.score < 0.5, "score was {}", scoring.score);
    }
}
