//! Applying an algorithm to a candidate set under the match policy.

use model::Entity;

use crate::algorithms::Algorithm;
use crate::types::{ScoredEntity, ScoringConfig};

/// Score every candidate and apply the `threshold`/`cutoff`/`limit`
/// policy: candidates scoring at or below the cutoff are dropped, those at
/// or above the threshold are marked as matches, the rest are returned as
/// non-matching context. Returns the match count and the trimmed ranking.
///
/// Scoring is CPU work on the request task; control is yielded after each
/// candidate so concurrent requests keep making progress.
pub async fn score_results(
    algorithm: &dyn Algorithm,
    query: &Entity,
    candidates: Vec<(Entity, f64)>,
    threshold: f64,
    cutoff: f64,
    limit: usize,
    config: &ScoringConfig,
) -> (usize, Vec<ScoredEntity>) {
    let mut scored: Vec<ScoredEntity> = Vec::new();
    let mut matches = 0usize;
    for (rank, (candidate, index_score)) in candidates.into_iter().enumerate() {
        let scoring = algorithm.compare(query, &candidate, config);
        tracing::debug!(
            candidate = candidate.id.as_str(),
            algorithm = algorithm.name(),
            rank,
            score = scoring.score,
            index_score,
            "scored candidate"
        );
        tokio::task::yield_now().await;
        if scoring.score <= cutoff {
            continue;
        }
        let is_match = scoring.score >= threshold;
        if is_match {
            matches += 1;
        }
        scored.push(ScoredEntity {
            entity: candidate,
            score: scoring.score,
            is_match,
            features: scoring.features,
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
    scored.truncate(limit);
    (matches, scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::get_algorithm;
    use serde_json::json;

    fn person(id: &str, name: &str) -> Entity {
        Entity::from_value(json!({
            "id": id,
            "schema": "Person",
            "properties": {"name": [name]},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn policy_is_applied() {
        let algorithm = get_algorithm("name-based").unwrap();
        let query = person("q", "Vladimir Putin");
        let candidates = vec![
            (person("exact", "Vladimir Putin"), 10.0),
            (person("close", "Vladimir Putim"), 8.0),
            (person("far", "Zebulon Quux"), 1.0),
        ];
        let (matches, scored) =
            score_results(algorithm, &query, candidates, 0.85, 0.5, 5, &ScoringConfig::default())
                .await;
        assert_eq!(scored[0].entity.id, "exact");
        assert!(scored[0].is_match);
        assert!(scored.iter().all(|s| s.score > 0.5));
        assert!(matches >= 1);
        assert!(!scored.iter().any(|s| s.entity.id == "far"));
    }

    #[tokio::test]
    async fn limit_trims_after_sorting() {
        let algorithm = get_algorithm("name-based").unwrap();
        let query = person("q", "Anna Schmidt");
        let candidates = vec![
            (person("a", "Anna Schmidt"), 1.0),
            (person("b", "Anna Schmitt"), 1.0),
            (person("c", "Ana Schmidt"), 1.0),
        ];
        let (_, scored) =
            score_results(algorithm, &query, candidates, 0.9, 0.1, 2, &ScoringConfig::default())
                .await;
        assert_eq!(scored.len(), 2);
        assert!(scored[0].score >= scored[1].score);
        assert_eq!(scored[0].entity.id, "a");
    }

    #[tokio::test]
    async fn match_flag_tracks_threshold() {
        let algorithm = get_algorithm("name-based").unwrap();
        let query = person("q", "Anna Schmidt");
        let candidates = vec![(person("a", "Anna Schmidt"), 1.0)];
        let (matches, scored) =
            score_results(algorithm, &query, candidates, 0.99, 0.0, 5, &ScoringConfig::default())
                .await;
        assert_eq!(matches, scored.iter().filter(|s| s.is_match).count());
        for hit in &scored {
            assert_eq!(hit.is_match, hit.score >= 0.99);
        }
    }
}
