//! Matching layer: scoring algorithms and the match policy.
//!
//! Candidates come out of the index broad; this crate makes them precise.
//! An [`Algorithm`] compares a query example against one candidate and
//! returns a score with per-feature contributions; [`score_results`]
//! applies the threshold, cutoff, and limit policy over a candidate set.

mod algorithms;
mod scorer;
mod types;

pub use algorithms::{
    get_algorithm, algorithm_names, Algorithm, LogicV1, NameBased, DEFAULT_ALGORITHM,
};
pub use scorer::score_results;
pub use types::{AlgorithmDoc, FeatureDoc, MatchError, ScoredEntity, Scoring, ScoringConfig};
