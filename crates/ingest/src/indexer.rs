//! The indexer: converge the search backend onto the current version of
//! every dataset with the least possible work.
//!
//! Per dataset the algorithm is: resolve the aliased base version, plan
//! full-vs-delta, take the reindex lock, build into a fresh or cloned
//! versioned index, then atomically roll the alias over. A failure deletes
//! the partial index and releases the lock with a failure record; other
//! datasets are unaffected.

use std::sync::Arc;
use std::time::Duration;

use index::{
    build_entity_doc, build_referent_doc, entity_mapping, index_settings, AuditLog, BulkOp,
    IndexNaming, ReindexJob, SearchProvider,
};
use model::{Catalog, Dataset, Entity};

use crate::error::IngestError;
use crate::updater::{DatasetUpdater, OpKind, OpStream};

/// Documents are flushed to the backend in batches of this size.
const BULK_CHUNK: usize = 1000;

/// How often the running build refreshes its lock heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Whether delta replays are allowed at all.
    pub delta_updates: bool,
    /// Shard count for new entity indices.
    pub shards: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig { delta_updates: true, shards: 1 }
    }
}

/// Outcome of one catalog pass.
#[derive(Debug, Default)]
pub struct UpdateSummary {
    /// Datasets whose index was rebuilt or patched.
    pub updated: Vec<String>,
    /// Datasets that were already current or locked elsewhere.
    pub skipped: Vec<String>,
    /// Datasets whose run failed, with the error message.
    pub failed: Vec<(String, String)>,
}

/// Drives index builds for the whole catalog.
pub struct Indexer {
    provider: Arc<dyn SearchProvider>,
    naming: IndexNaming,
    audit: AuditLog,
    client: reqwest::Client,
    config: IngestConfig,
}

impl Indexer {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        naming: IndexNaming,
        audit: AuditLog,
        client: reqwest::Client,
        config: IngestConfig,
    ) -> Indexer {
        Indexer { provider, naming, audit, client, config }
    }

    /// Run an update pass over every dataset in the catalog. Failures are
    /// contained per dataset.
    pub async fn update_all(&self, catalog: &Catalog, force: bool) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        for dataset in catalog.iter() {
            match self.update_dataset(dataset, force).await {
                Ok(true) => summary.updated.push(dataset.name.clone()),
                Ok(false) => summary.skipped.push(dataset.name.clone()),
                Err(err) => {
                    tracing::error!(
                        dataset = dataset.name.as_str(),
                        error = %err,
                        "dataset update failed"
                    );
                    summary.failed.push((dataset.name.clone(), err.to_string()));
                }
            }
        }
        tracing::info!(
            updated = summary.updated.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "update pass done"
        );
        summary
    }

    /// Converge one dataset. Returns whether an index build happened.
    pub async fn update_dataset(&self, dataset: &Dataset, force: bool) -> Result<bool, IngestError> {
        let aliased = self.provider.alias_indices(self.naming.alias()).await?;
        let base_version = self.naming.aliased_version(&aliased, &dataset.name);
        let updater = DatasetUpdater::build(
            &self.client,
            dataset,
            base_version,
            force,
            self.config.delta_updates,
        )
        .await;
        if !updater.needs_update() {
            tracing::debug!(dataset = dataset.name.as_str(), "dataset is up to date");
            return Ok(false);
        }

        let next_index = self
            .naming
            .index_for(&dataset.name, updater.target_version())?;
        if self
            .provider
            .exists_index_alias(self.naming.alias(), &next_index)
            .await?
        {
            tracing::debug!(index = next_index.as_str(), "index is already aliased");
            return Ok(false);
        }

        let job = ReindexJob {
            index: next_index.clone(),
            dataset: dataset.name.clone(),
            dataset_version: updater.target_version().to_string(),
            reindex_type: updater.reindex_type(),
        };
        if !self.audit.acquire_reindex_lock(&job).await? {
            tracing::info!(
                index = next_index.as_str(),
                "another instance is reindexing, skipping"
            );
            return Ok(false);
        }

        let heartbeat = self.spawn_heartbeat(next_index.clone());
        let built = self.build_index(&updater, &next_index).await;
        heartbeat.abort();

        match built {
            Ok(count) => {
                self.provider.refresh(&next_index).await?;
                self.provider
                    .rollover_index(
                        self.naming.alias(),
                        &next_index,
                        &self.naming.dataset_prefix(&dataset.name),
                    )
                    .await?;
                self.audit.release_reindex_lock(&job, true).await?;
                self.audit.log_rollover(&job).await?;
                tracing::info!(
                    dataset = dataset.name.as_str(),
                    index = next_index.as_str(),
                    entities = count,
                    "dataset index is live"
                );
                self.cleanup_stale(&dataset.name, &next_index).await;
                Ok(true)
            }
            Err(err) => {
                if let Err(cleanup) = self.provider.delete_index(&next_index).await {
                    tracing::error!(
                        index = next_index.as_str(),
                        error = %cleanup,
                        "could not delete partial index"
                    );
                }
                self.audit.release_reindex_lock(&job, false).await?;
                Err(err)
            }
        }
    }

    /// Create or clone the target index and stream the plan's operations
    /// into it. Returns the number of applied operations.
    async fn build_index(
        &self,
        updater: &DatasetUpdater,
        next_index: &str,
    ) -> Result<usize, IngestError> {
        let dataset = updater.dataset();
        match (updater.is_incremental(), updater.base_version()) {
            (true, Some(base_version)) => {
                let base_index = self.naming.index_for(&dataset.name, base_version)?;
                tracing::info!(
                    base = base_index.as_str(),
                    target = next_index,
                    "cloning index for delta replay"
                );
                self.provider.clone_index(&base_index, next_index).await?;
            }
            _ => {
                self.provider
                    .create_index(next_index, entity_mapping(), index_settings(self.config.shards))
                    .await?;
            }
        }

        let mut stream: OpStream = updater.stream()?;
        let mut ops: Vec<BulkOp> = Vec::with_capacity(BULK_CHUNK);
        let mut count = 0usize;
        while let Some(op) = stream.next_op(&self.client).await? {
            let entity = match Entity::from_value(op.entity) {
                Ok(entity) => entity,
                Err(model::ModelError::UnknownSchema(schema)) => {
                    tracing::warn!(schema = schema.as_str(), "skipping entity of unknown schema");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            match op.op {
                OpKind::Add | OpKind::Mod => {
                    ops.push(BulkOp::Index {
                        index: next_index.to_string(),
                        id: entity.id.clone(),
                        doc: build_entity_doc(&entity),
                    });
                    for referent in &entity.referents {
                        if referent == &entity.id {
                            continue;
                        }
                        ops.push(BulkOp::Index {
                            index: next_index.to_string(),
                            id: referent.clone(),
                            doc: build_referent_doc(&entity.id),
                        });
                    }
                }
                OpKind::Del => {
                    ops.push(BulkOp::Delete {
                        index: next_index.to_string(),
                        id: entity.id.clone(),
                    });
                    for referent in &entity.referents {
                        if referent == &entity.id {
                            continue;
                        }
                        ops.push(BulkOp::Delete {
                            index: next_index.to_string(),
                            id: referent.clone(),
                        });
                    }
                }
            }
            count += 1;
            if count % 1000 == 0 {
                tracing::info!(index = next_index, entities = count, "indexing progress");
            }
            if ops.len() >= BULK_CHUNK {
                self.provider.bulk_index(std::mem::take(&mut ops)).await?;
            }
        }
        if !ops.is_empty() {
            self.provider.bulk_index(ops).await?;
        }
        Ok(count)
    }

    fn spawn_heartbeat(&self, next_index: String) -> tokio::task::JoinHandle<()> {
        let audit = self.audit.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                match audit.refresh_reindex_lock(&next_index).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            index = next_index.as_str(),
                            "reindex lock is gone, heartbeat stopped"
                        );
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(index = next_index.as_str(), error = %err, "heartbeat failed");
                    }
                }
            }
        })
    }

    /// Delete concrete indices for this dataset that are no longer aliased.
    async fn cleanup_stale(&self, dataset: &str, next_index: &str) {
        let prefix = self.naming.dataset_prefix(dataset);
        let indices = match self.provider.all_indices().await {
            Ok(indices) => indices,
            Err(err) => {
                tracing::warn!(error = %err, "cannot list indices for cleanup");
                return;
            }
        };
        for name in indices {
            if !name.starts_with(&prefix) || name == next_index {
                continue;
            }
            tracing::info!(index = name.as_str(), "deleting stale index");
            if let Err(err) = self.provider.delete_index(&name).await {
                tracing::warn!(index = name.as_str(), error = %err, "could not delete stale index");
            }
        }
    }
}
