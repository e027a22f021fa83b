//! Umbrella crate for the sanscreen screening service.
//!
//! Re-exports the layers so applications and tests can drive the whole
//! pipeline through one dependency: the entity model, the name analyzer,
//! the search backend abstraction, dataset ingestion, the scoring
//! algorithms, and the HTTP server.

pub use index::{
    build_entity_doc, build_referent_doc, entity_mapping, index_settings, AuditLog, BulkOp,
    FetchResult, FilterSpec, IndexError, IndexNaming, MemoryProvider, NestedEntity, ReindexJob,
    ReindexType, SearchOpts, SearchProvider, SearchResponse, Total,
};
pub use ingest::{
    build_client, DatasetUpdater, FetchSettings, Indexer, IngestConfig, IngestError, Manifest,
    UpdateSummary,
};
pub use matcher::{
    algorithm_names, get_algorithm, score_results, Algorithm, MatchError, ScoredEntity,
    ScoringConfig, DEFAULT_ALGORITHM,
};
pub use model::{Catalog, Dataset, Entity, ModelError, NameKind, PropType, Schema};
pub use names::{analyze_name, expand_dates, pick_names, Name, Symbol, SymbolCategory};
pub use server::{build_router, start_server, AppState, Settings};
