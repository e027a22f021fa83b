//! The default comparator: name agreement qualified by the other
//! properties a screening example typically carries.

use std::collections::BTreeMap;

use model::Entity;

use super::features;
use super::Algorithm;
use crate::types::{AlgorithmDoc, FeatureDoc, Scoring, ScoringConfig};

const W_NAME: f64 = 0.6;
const W_DOB: f64 = 0.1;
const W_COUNTRY: f64 = 0.1;
const W_IDENTIFIER: f64 = 0.2;
const W_DOB_MISMATCH: f64 = -0.15;
const W_GENDER_MISMATCH: f64 = -0.2;

/// Name similarity as the backbone, pushed up by agreeing dates of birth,
/// countries, and registration numbers, pushed down by contradictions.
/// Absent properties contribute nothing either way.
pub struct LogicV1;

impl Algorithm for LogicV1 {
    fn name(&self) -> &'static str {
        "logic-v1"
    }

    fn explain(&self) -> AlgorithmDoc {
        AlgorithmDoc {
            name: self.name(),
            description: "Name similarity qualified by dates, countries, \
                          identifiers, and gender.",
            features: BTreeMap::from([
                (
                    "name_similarity",
                    FeatureDoc {
                        description: "Best Jaro-Winkler similarity across name pairs",
                        weight: W_NAME,
                    },
                ),
                (
                    "dob_match",
                    FeatureDoc {
                        description: "A date agrees at the precision of the vaguer side",
                        weight: W_DOB,
                    },
                ),
                (
                    "country_match",
                    FeatureDoc {
                        description: "Any country value agrees",
                        weight: W_COUNTRY,
                    },
                ),
                (
                    "identifier_match",
                    FeatureDoc {
                        description: "Any identifier agrees after normalization",
                        weight: W_IDENTIFIER,
                    },
                ),
                (
                    "dob_mismatch",
                    FeatureDoc {
                        description: "Both sides carry dates and none agree",
                        weight: W_DOB_MISMATCH,
                    },
                ),
                (
                    "gender_mismatch",
                    FeatureDoc {
                        description: "Gender values contradict",
                        weight: W_GENDER_MISMATCH,
                    },
                ),
            ]),
        }
    }

    fn compare(&self, query: &Entity, candidate: &Entity, config: &ScoringConfig) -> Scoring {
        let mut features = BTreeMap::new();
        let mut score = 0.0;
        let mut apply = |name: &str, weight: f64, value: f64| {
            if value == 0.0 {
                return;
            }
            let contribution = config.weight(name, weight) * value;
            features.insert(name.to_string(), contribution);
            score += contribution;
        };

        apply("name_similarity", W_NAME, features::name_similarity(query, candidate));
        match features::date_match(query, candidate) {
            Some(true) => apply("dob_match", W_DOB, 1.0),
            Some(false) => apply("dob_mismatch", W_DOB_MISMATCH, 1.0),
            None => {}
        }
        if features::country_match(query, candidate) == Some(true) {
            apply("country_match", W_COUNTRY, 1.0);
        }
        if features::identifier_match(query, candidate) == Some(true) {
            apply("identifier_match", W_IDENTIFIER, 1.0);
        }
        if features::gender_mismatch(query, candidate) {
            apply("gender_mismatch", W_GENDER_MISMATCH, 1.0);
        }

        Scoring { score: score.clamp(0.0, 1.0), features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate() -> Entity {
        Entity::from_value(json!({
            "id": "Q7747",
            "schema": "Person",
            "properties": {
                "name": ["Vladimir Putin"],
                "birthDate": ["1952-10-07"],
                "citizenship": ["ru"],
                "gender": ["male"],
            },
        }))
        .unwrap()
    }

    fn query(props: serde_json::Value) -> Entity {
        Entity::from_value(json!({
            "id": "example",
            "schema": "Person",
            "properties": props,
        }))
        .unwrap()
    }

    #[test]
    fn qualified_match_beats_threshold() {
        let query = query(json!({
            "name": ["Vladimir Putin"],
            "birthDate": ["1952"],
            "country": ["ru"],
        }));
        let scoring = LogicV1.compare(&query, &candidate(), &ScoringConfig::default());
        assert!(scoring.score > 0.70, "score was {}", scoring.score);
        assert!(scoring.features.contains_key("dob_match"));
        assert!(scoring.features.contains_key("country_match"));
    }

    #[test]
    fn name_only_stays_below_threshold() {
        let query = query(json!({"name": ["Vladimir Putin"]}));
        let scoring = LogicV1.compare(&query, &candidate(), &ScoringConfig::default());
        assert!(scoring.score < 0.70, "score was {}", scoring.score);
    }

    #[test]
    fn contradicting_date_pushes_down() {
        let with_dob = query(json!({"name": ["Vladimir Putin"], "birthDate": ["1980"]}));
        let without = query(json!({"name": ["Vladimir Putin"]}));
        let config = ScoringConfig::default();
        let scored_with = LogicV1.compare(&with_dob, &candidate(), &config);
        let scored_without = LogicV1.compare(&without, &candidate(), &config);
        assert!(scored_with.score < scored_without.score);
        assert!(scored_with.features.contains_key("dob_mismatch"));
    }

    #[test]
    fn gender_contradiction_penalized() {
        let query = query(json!({
            "name": ["Vladimir Putin"],
            "gender": ["female"],
        }));
        let scoring = LogicV1.compare(&query, &candidate(), &ScoringConfig::default());
        assert!(scoring.features.get("gender_mismatch").copied().unwrap_or(0.0) < 0.0);
    }

    #[test]
    fn identifier_agreement_is_strong() {
        let candidate = Entity::from_value(json!({
            "id": "c1",
            "schema": "Company",
            "properties": {
                "name": ["Gazprom Bank"],
                "registrationNumber": ["INN 7744-001497"],
            },
        }))
        .unwrap();
        let query = Entity::from_value(json!({
            "id": "example",
            "schema": "Company",
            "properties": {
                "name": ["Gazprom Bank JSC"],
                "registrationNumber": ["inn7744001497"],
            },
        }))
        .unwrap();
        let scoring = LogicV1.compare(&query, &candidate, &ScoringConfig::default());
        assert!(scoring.features.contains_key("identifier_match"));
        assert!(scoring.score > 0.70, "score was {}", scoring.score);
    }
}
