//! Shared application state.

use std::sync::Arc;

use tokio::sync::RwLock;

use index::{AuditLog, IndexNaming, SearchProvider};
use ingest::{FetchSettings, Indexer, IngestConfig, Manifest, UpdateSummary};
use model::{Catalog, Dataset};

use crate::config::Settings;
use crate::error::{AppError, AppResult};

/// Everything the request handlers share, built once at startup.
pub struct AppState {
    pub settings: Settings,
    pub provider: Arc<dyn SearchProvider>,
    pub naming: IndexNaming,
    pub catalog: RwLock<Catalog>,
    pub indexer: Indexer,
    client: reqwest::Client,
    manifest_location: String,
}

impl AppState {
    /// Connect to the backend, resolve the manifest, and assemble state.
    pub async fn init(settings: Settings) -> anyhow::Result<Arc<AppState>> {
        let elastic = index::ElasticConfig {
            url: settings.index_url.clone(),
            username: settings.index_username.clone(),
            password: settings.index_password.clone(),
            backend_type: settings.index_type.clone(),
            query_concurrency: settings.query_concurrency,
        };
        let provider: Arc<dyn SearchProvider> =
            Arc::new(index::ElasticsearchProvider::connect(&elastic).await?);

        let bootstrap = ingest::build_client(&FetchSettings {
            proxy: proxy_of(&settings),
            auth_token: None,
        })?;
        let manifest = Manifest::load(&bootstrap, &settings.manifest).await?;
        let client = ingest::build_client(&FetchSettings {
            proxy: proxy_of(&settings),
            auth_token: manifest.auth_token.clone(),
        })?;
        let catalog = manifest.resolve(&client).await?;
        tracing::info!(datasets = catalog.len(), "catalog resolved");

        Ok(Self::assemble(settings, provider, catalog, client))
    }

    /// Assemble state from parts. Also the entry point for tests, which
    /// pass the in-memory provider.
    pub fn assemble(
        settings: Settings,
        provider: Arc<dyn SearchProvider>,
        catalog: Catalog,
        client: reqwest::Client,
    ) -> Arc<AppState> {
        let naming = IndexNaming::new(&settings.index_name, &settings.index_version)
            .expect("settings were validated at load");
        let audit = AuditLog::new(
            provider.clone(),
            naming.audit_index(),
            naming.alias(),
            index::schema_digits().as_str(),
        );
        let indexer = Indexer::new(
            provider.clone(),
            naming.clone(),
            audit,
            client.clone(),
            IngestConfig {
                delta_updates: settings.delta_updates,
                shards: settings.index_shards,
            },
        );
        let manifest_location = settings.manifest.clone();
        Arc::new(AppState {
            settings,
            provider,
            naming,
            catalog: RwLock::new(catalog),
            indexer,
            client,
            manifest_location,
        })
    }

    /// Look up a dataset in the catalog.
    pub async fn get_dataset(&self, name: &str) -> AppResult<Dataset> {
        let catalog = self.catalog.read().await;
        catalog
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound("No such dataset.".to_string()))
    }

    /// Re-resolve the manifest into a fresh catalog.
    pub async fn reload_catalog(&self) -> AppResult<()> {
        let manifest = Manifest::load(&self.client, &self.manifest_location)
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?;
        let fresh = manifest
            .resolve(&self.client)
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?;
        let mut catalog = self.catalog.write().await;
        *catalog = fresh;
        Ok(())
    }

    /// One full update pass: refresh the catalog, then converge every
    /// dataset.
    pub async fn run_update(&self, force: bool) -> AppResult<UpdateSummary> {
        if let Err(err) = self.reload_catalog().await {
            tracing::warn!(error = %err, "catalog reload failed, updating with cached catalog");
        }
        let catalog = self.catalog.read().await.clone();
        Ok(self.indexer.update_all(&catalog, force).await)
    }
}

fn proxy_of(settings: &Settings) -> Option<String> {
    if settings.http_proxy.is_empty() {
        None
    } else {
        Some(settings.http_proxy.clone())
    }
}
