//! Elasticsearch/OpenSearch implementation of the provider.
//!
//! The wire dialects are close enough that one client serves both; the
//! configured backend type is validated upstream and only logged here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cat::CatIndicesParts;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::Url;
use elasticsearch::indices::{
    IndicesCloneParts, IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts,
    IndicesGetAliasParts, IndicesPutSettingsParts, IndicesRefreshParts,
};
use elasticsearch::params::SearchType;
use elasticsearch::{BulkParts, Elasticsearch, SearchParts};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

use crate::error::IndexError;
use crate::provider::{BulkOp, Hit, SearchOpts, SearchProvider, SearchResponse, Total};

/// Bulk requests are sent in chunks of this many operations.
const BULK_CHUNK: usize = 1000;

/// Connection settings for the search cluster.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `elasticsearch` or `opensearch`; informational.
    pub backend_type: String,
    /// Bound on concurrently executing search calls.
    pub query_concurrency: usize,
}

/// Provider speaking to a live cluster.
pub struct ElasticsearchProvider {
    client: Elasticsearch,
    query_semaphore: Arc<Semaphore>,
}

impl ElasticsearchProvider {
    /// Connect to the cluster, waiting for it to reach yellow health.
    /// Retries with a growing backoff; gives up after eight attempts.
    pub async fn connect(config: &ElasticConfig) -> Result<ElasticsearchProvider, IndexError> {
        tracing::info!(
            url = config.url.as_str(),
            backend = config.backend_type.as_str(),
            "connecting to search backend"
        );
        for attempt in 2u64..9 {
            match Self::try_connect(config).await {
                Ok(provider) => return Ok(provider),
                Err(err) => {
                    tracing::error!(error = %err, attempt, "cannot connect to search backend");
                    tokio::time::sleep(Duration::from_secs(attempt * attempt)).await;
                }
            }
        }
        Err(IndexError::backend("could not connect to the search backend"))
    }

    async fn try_connect(config: &ElasticConfig) -> Result<ElasticsearchProvider, IndexError> {
        let url = Url::parse(&config.url)
            .map_err(|err| IndexError::invalid(format!("invalid index url: {err}")))?;
        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        let transport = builder
            .build()
            .map_err(|err| IndexError::backend(format!("transport setup failed: {err}")))?;
        let client = Elasticsearch::new(transport);

        let response = client
            .cluster()
            .health(ClusterHealthParts::None)
            .wait_for_status(elasticsearch::params::WaitForStatus::Yellow)
            .timeout("15s")
            .send()
            .await
            .map_err(|err| IndexError::backend(err.to_string()))?;
        if !response.status_code().is_success() {
            return Err(IndexError::backend(format!(
                "cluster health returned {}",
                response.status_code()
            )));
        }
        Ok(ElasticsearchProvider {
            client,
            query_semaphore: Arc::new(Semaphore::new(config.query_concurrency.max(1))),
        })
    }

    async fn read_error(&self, response: Response) -> IndexError {
        let status = response.status_code().as_u16();
        let body: Value = response.json().await.unwrap_or_default();
        let error_type = body["error"]["type"].as_str().unwrap_or("");
        let reason = body["error"]["reason"].as_str().unwrap_or("unknown error");
        match error_type {
            "index_not_found_exception" => IndexError::IndexNotReady(format!(
                "index absent, possibly misconfigured or still being created: {reason}"
            )),
            "search_phase_execution_exception"
            | "parsing_exception"
            | "x_content_parse_exception"
            | "illegal_argument_exception" => IndexError::invalid(reason.to_string()),
            _ => IndexError::Backend(format!("status {status}: {reason}")),
        }
    }
}

fn transport_err(err: elasticsearch::Error) -> IndexError {
    IndexError::Backend(err.to_string())
}

#[async_trait]
impl SearchProvider for ElasticsearchProvider {
    async fn check_health(&self) -> bool {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .timeout("5s")
            .send()
            .await;
        let Ok(response) = response else { return false };
        let Ok(body) = response.json::<Value>().await else { return false };
        matches!(body["status"].as_str(), Some("yellow") | Some("green"))
    }

    async fn refresh(&self, index: &str) -> Result<(), IndexError> {
        self.client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(transport_err)?;
        Ok(())
    }

    async fn all_indices(&self) -> Result<Vec<String>, IndexError> {
        let response = self
            .client
            .cat()
            .indices(CatIndicesParts::None)
            .format("json")
            .send()
            .await
            .map_err(transport_err)?;
        let body: Vec<Value> = response.json().await.map_err(transport_err)?;
        Ok(body
            .iter()
            .filter_map(|spec| spec["index"].as_str().map(str::to_string))
            .collect())
    }

    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, IndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status_code().is_success() {
            return Err(self.read_error(response).await);
        }
        let body: Map<String, Value> = response.json().await.map_err(transport_err)?;
        Ok(body.keys().cloned().collect())
    }

    async fn rollover_index(
        &self,
        alias: &str,
        next_index: &str,
        prefix: &str,
    ) -> Result<(), IndexError> {
        let current = self.alias_indices(alias).await?;
        let mut actions: Vec<Value> = current
            .iter()
            .filter(|name| name.starts_with(prefix) && name.as_str() != next_index)
            .map(|name| json!({"remove": {"index": name, "alias": alias}}))
            .collect();
        actions.push(json!({"add": {"index": next_index, "alias": alias}}));
        let response = self
            .client
            .indices()
            .update_aliases()
            .body(json!({"actions": actions}))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status_code().is_success() {
            return Err(self.read_error(response).await);
        }
        tracing::info!(index = next_index, alias, "alias rolled over");
        Ok(())
    }

    async fn clone_index(&self, base: &str, target: &str) -> Result<(), IndexError> {
        if base == target {
            return Err(IndexError::invalid("cannot clone an index to itself"));
        }
        let read_only = |value: bool| json!({"index.blocks.read_only": value});
        self.client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[base]))
            .body(read_only(true))
            .send()
            .await
            .map_err(transport_err)?;

        let result = async {
            self.delete_index(target).await?;
            let response = self
                .client
                .indices()
                .clone(IndicesCloneParts::IndexTarget(base, target))
                .body(json!({"settings": {"index": {"blocks": {"read_only": false}}}}))
                .send()
                .await
                .map_err(transport_err)?;
            if !response.status_code().is_success() {
                return Err(self.read_error(response).await);
            }
            tracing::info!(base, target, "cloned index");
            Ok(())
        }
        .await;

        // The source must come back writable even when the clone failed.
        let restore = self
            .client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[base]))
            .body(read_only(false))
            .send()
            .await;
        if let Err(err) = restore {
            tracing::error!(base, error = %err, "could not restore index to writable");
        }
        result
    }

    async fn create_index(
        &self,
        index: &str,
        mappings: Value,
        settings: Value,
    ) -> Result<(), IndexError> {
        tracing::info!(index, "creating index");
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(json!({"mappings": mappings, "settings": settings}))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status_code().is_success() {
            return Ok(());
        }
        let error = self.read_error(response).await;
        if let IndexError::Backend(message) = &error {
            if message.contains("resource_already_exists_exception")
                || message.contains("already exists")
            {
                return Ok(());
            }
        }
        Err(error)
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status_code().is_success() || response.status_code().as_u16() == 404 {
            return Ok(());
        }
        Err(self.read_error(response).await)
    }

    async fn exists_index_alias(&self, alias: &str, index: &str) -> Result<bool, IndexError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::IndexName(&[index], &[alias]))
            .send()
            .await
            .map_err(transport_err)?;
        Ok(response.status_code().is_success())
    }

    async fn search(
        &self,
        index: &str,
        query: Value,
        opts: SearchOpts,
    ) -> Result<SearchResponse, IndexError> {
        let mut body = Map::new();
        body.insert("query".to_string(), query);
        if !opts.sort.is_empty() {
            body.insert("sort".to_string(), Value::Array(opts.sort.clone()));
        }
        if let Some(aggregations) = &opts.aggregations {
            body.insert("aggregations".to_string(), aggregations.clone());
        }

        let _permit = self
            .query_semaphore
            .acquire()
            .await
            .map_err(|_| IndexError::backend("query semaphore closed"))?;

        let index_parts = [index];
        let mut request = self.client.search(SearchParts::Index(&index_parts));
        if let Some(size) = opts.size {
            request = request.size(size as i64);
        }
        if let Some(from) = opts.from {
            request = request.from(from as i64);
        }
        if opts.rank_precise {
            // Several differently sized indices behind one alias skew term
            // statistics; DFS ranking restores comparable scores.
            request = request.search_type(SearchType::DfsQueryThenFetch);
        }
        let response = request
            .body(Value::Object(body))
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status_code().is_success() {
            return Err(self.read_error(response).await);
        }
        let body: Value = response.json().await.map_err(transport_err)?;

        let hits = body["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        Some(Hit {
                            id: hit["_id"].as_str()?.to_string(),
                            score: hit["_score"].as_f64(),
                            source: hit["_source"].clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(SearchResponse {
            hits,
            total: Total {
                value: body["hits"]["total"]["value"].as_u64().unwrap_or(0),
                relation: body["hits"]["total"]["relation"]
                    .as_str()
                    .unwrap_or("eq")
                    .to_string(),
            },
            aggregations: body.get("aggregations").cloned(),
            took_ms: body["took"].as_u64().unwrap_or(0),
        })
    }

    async fn bulk_index(&self, ops: Vec<BulkOp>) -> Result<(), IndexError> {
        for chunk in ops.chunks(BULK_CHUNK) {
            let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(chunk.len() * 2);
            for op in chunk {
                match op {
                    BulkOp::Index { index, id, doc } => {
                        body.push(json!({"index": {"_index": index, "_id": id}}).into());
                        body.push(doc.clone().into());
                    }
                    BulkOp::Update { index, id, doc } => {
                        body.push(json!({"update": {"_index": index, "_id": id}}).into());
                        body.push(json!({"doc": doc}).into());
                    }
                    BulkOp::Delete { index, id } => {
                        body.push(json!({"delete": {"_index": index, "_id": id}}).into());
                    }
                }
            }
            let response = self
                .client
                .bulk(BulkParts::None)
                .body(body)
                .send()
                .await
                .map_err(transport_err)?;
            if !response.status_code().is_success() {
                return Err(self.read_error(response).await);
            }
            let result: Value = response.json().await.map_err(transport_err)?;
            if result["errors"].as_bool().unwrap_or(false) {
                let detail = first_bulk_error(&result);
                return Err(IndexError::Backend(format!("bulk indexing failed: {detail}")));
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        // The transport has no explicit shutdown; dropping closes sockets.
        Ok(())
    }
}

fn first_bulk_error(result: &Value) -> String {
    let items = result["items"].as_array();
    let error = items.and_then(|items| {
        items.iter().find_map(|item| {
            item.as_object()?
                .values()
                .find_map(|action| action.get("error"))
        })
    });
    match error {
        Some(error) => error["reason"].as_str().unwrap_or("unknown reason").to_string(),
        None => "unknown reason".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_error_extraction() {
        let result = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 200}},
                {"index": {"_id": "b", "status": 400, "error": {"reason": "mapper parsing"}}},
            ]
        });
        assert_eq!(first_bulk_error(&result), "mapper parsing");
        assert_eq!(first_bulk_error(&json!({"errors": true})), "unknown reason");
    }
}
