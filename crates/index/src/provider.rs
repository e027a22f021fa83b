//! The search backend abstraction.
//!
//! Everything the service needs from the search store is expressed through
//! [`SearchProvider`], so the ingest and query layers never talk to a
//! concrete client. The production implementation speaks the
//! Elasticsearch/OpenSearch wire protocol; an in-memory implementation
//! backs tests and ephemeral setups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexError;

/// Total hit count with its relation (`eq` or `gte`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Total {
    pub value: u64,
    pub relation: String,
}

impl Total {
    pub fn eq(value: u64) -> Total {
        Total { value, relation: "eq".to_string() }
    }
}

/// A single search hit: document id, relevance score, and source body.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
}

/// A parsed search response.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total: Total,
    pub aggregations: Option<Value>,
    pub took_ms: u64,
}

/// Options for a search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOpts {
    pub size: Option<usize>,
    pub from: Option<usize>,
    pub sort: Vec<Value>,
    pub aggregations: Option<Value>,
    /// Use exact (DFS) ranking. Needed when several differently sized
    /// indices share an alias and term statistics would skew scores.
    pub rank_precise: bool,
}

impl SearchOpts {
    pub fn sized(size: usize) -> SearchOpts {
        SearchOpts { size: Some(size), ..SearchOpts::default() }
    }
}

/// A single operation in a bulk request.
#[derive(Debug, Clone)]
pub enum BulkOp {
    /// Insert or replace a document.
    Index { index: String, id: String, doc: Value },
    /// Partially update an existing document.
    Update { index: String, id: String, doc: Value },
    /// Delete a document by id. Missing documents are not an error.
    Delete { index: String, id: String },
}

/// Async interface to the search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Whether the cluster is reachable and at least yellow.
    async fn check_health(&self) -> bool;

    /// Make recent writes visible to searches.
    async fn refresh(&self, index: &str) -> Result<(), IndexError>;

    /// Names of all indices in the cluster.
    async fn all_indices(&self) -> Result<Vec<String>, IndexError>;

    /// Names of the indices an alias points to. An unknown alias yields an
    /// empty list.
    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, IndexError>;

    /// Atomically re-point the alias: every current member whose name
    /// starts with `prefix` is removed and `next_index` is added, in one
    /// alias-update call, so readers never observe an empty alias.
    async fn rollover_index(&self, alias: &str, next_index: &str, prefix: &str)
        -> Result<(), IndexError>;

    /// Copy an index under a new name. The source is marked read-only for
    /// the duration and restored afterwards.
    async fn clone_index(&self, base: &str, target: &str) -> Result<(), IndexError>;

    /// Create an index with the given mappings and settings. Creating an
    /// index that already exists is not an error.
    async fn create_index(&self, index: &str, mappings: Value, settings: Value)
        -> Result<(), IndexError>;

    /// Delete an index if it exists.
    async fn delete_index(&self, index: &str) -> Result<(), IndexError>;

    /// Whether `index` exists and is a member of `alias`.
    async fn exists_index_alias(&self, alias: &str, index: &str) -> Result<bool, IndexError>;

    /// Run a query against an index or alias.
    async fn search(&self, index: &str, query: Value, opts: SearchOpts)
        -> Result<SearchResponse, IndexError>;

    /// Apply a batch of document operations.
    async fn bulk_index(&self, ops: Vec<BulkOp>) -> Result<(), IndexError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), IndexError>;
}
