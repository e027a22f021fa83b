//! Search backend layer.
//!
//! The [`SearchProvider`] trait is everything the rest of the service
//! knows about the search store. This crate also owns what gets stored
//! and asked: the entity mapping and sidecar synthesis, versioned index
//! naming, the audit log with the reindex lock, the query builders, and
//! the nested-fetch resolver.

pub mod audit;
#[cfg(feature = "backend-elastic")]
mod elastic;
mod error;
mod mapping;
mod memory;
mod nested;
mod provider;
pub mod queries;
mod results;
mod versions;

pub use audit::{AuditLog, MessageType, ReindexJob, ReindexType, LOCK_EXPIRATION};
#[cfg(feature = "backend-elastic")]
pub use elastic::{ElasticConfig, ElasticsearchProvider};
pub use error::IndexError;
pub use mapping::{build_entity_doc, build_referent_doc, entity_mapping, index_settings};
pub use memory::MemoryProvider;
pub use nested::{get_adjacent, serialize_entity, AdjacentPage, NestedEntity};
pub use provider::{BulkOp, Hit, SearchOpts, SearchProvider, SearchResponse, Total};
pub use queries::{
    candidate_limit, entity_query, facet_aggregations, parse_sorts, prefix_query, text_query,
    FilterSpec, MAX_RESULTS,
};
pub use results::{get_entity, result_entities, result_entity, FetchResult};
pub use versions::{schema_digits, IndexNaming};
