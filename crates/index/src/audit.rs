//! The audit log and the reindex lock built on it.
//!
//! Every lifecycle event of an index build is a document in a dedicated
//! single-shard index. The most recent document for an index name
//! classifies it as locked or free, which doubles as a cross-replica
//! mutual-exclusion primitive without needing compare-and-swap from the
//! backend: writers first record a tentative claim, wait for the write
//! order to settle, and then read back who came first.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::IndexError;
use crate::provider::{BulkOp, SearchOpts, SearchProvider};

/// A lock with no heartbeat for this long is considered abandoned.
pub const LOCK_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// How many head records are scanned when resolving a tentative-claim race.
const RACE_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexType {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Written first; the writer then waits for eventual consistency to
    /// settle before the winner writes `ReindexStarted`.
    ReindexLockTentative,
    /// The active lock, refreshed by heartbeat while the build runs.
    ReindexStarted,
    /// Terminal records; either one releases the lock.
    ReindexCompleted,
    ReindexFailed,
    /// Informational only, written after the alias swap.
    IndexAliasRolloverComplete,
}

impl MessageType {
    fn as_str(&self) -> &'static str {
        match self {
            MessageType::ReindexLockTentative => "reindex_lock_tentative",
            MessageType::ReindexStarted => "reindex_started",
            MessageType::ReindexCompleted => "reindex_completed",
            MessageType::ReindexFailed => "reindex_failed",
            MessageType::IndexAliasRolloverComplete => "index_alias_rollover_complete",
        }
    }
}

/// Identity of one index build, stamped into every record it writes.
#[derive(Debug, Clone)]
pub struct ReindexJob {
    pub index: String,
    pub dataset: String,
    pub dataset_version: String,
    pub reindex_type: ReindexType,
}

/// Handle on the audit-log index.
#[derive(Clone)]
pub struct AuditLog {
    provider: Arc<dyn SearchProvider>,
    index: String,
    alias: String,
    software_version: String,
    /// Identity of this writer; makes tentative claims from concurrent
    /// replicas distinct documents even within the same millisecond.
    writer: String,
}

impl AuditLog {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        audit_index: &str,
        alias: &str,
        software_version: &str,
    ) -> AuditLog {
        AuditLog {
            provider,
            index: audit_index.to_string(),
            alias: alias.to_string(),
            software_version: software_version.to_string(),
            writer: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        if self.provider.all_indices().await?.contains(&self.index) {
            return Ok(());
        }
        let mappings = json!({
            "properties": {
                "alias_index": {"type": "keyword"},
                "index": {"type": "keyword"},
                "dataset": {"type": "keyword"},
                "dataset_version": {"type": "keyword"},
                "software_version": {"type": "keyword"},
                "message_type": {"type": "keyword"},
                "reindex_type": {"type": "keyword"},
                "writer": {"type": "keyword"},
                "timestamp": {"type": "date", "format": "epoch_millis"},
                "heartbeat_timestamp": {"type": "date", "format": "epoch_millis"},
            }
        });
        // A single shard keeps the record order free of cross-shard skew.
        let settings = json!({"number_of_shards": 1, "auto_expand_replicas": "0-all"});
        self.provider.create_index(&self.index, mappings, settings).await
    }

    /// Write one lifecycle record and return its document id.
    pub async fn log_message(
        &self,
        message_type: MessageType,
        job: &ReindexJob,
    ) -> Result<String, IndexError> {
        let timestamp = Utc::now().timestamp_millis();
        let doc_id = format!(
            "{}-{}-{}-{}",
            job.index,
            message_type.as_str(),
            timestamp,
            self.writer
        );
        let doc = json!({
            "alias_index": self.alias,
            "index": job.index,
            "dataset": job.dataset,
            "dataset_version": job.dataset_version,
            "software_version": self.software_version,
            "message_type": message_type.as_str(),
            "reindex_type": job.reindex_type,
            "writer": self.writer,
            "timestamp": timestamp,
        });
        self.provider
            .bulk_index(vec![BulkOp::Index {
                index: self.index.clone(),
                id: doc_id.clone(),
                doc,
            }])
            .await?;
        // Make the record visible before anyone re-reads the log.
        self.provider.refresh(&self.index).await?;
        Ok(doc_id)
    }

    async fn recent_messages(&self, index: &str, size: usize) -> Result<Vec<(String, Value)>, IndexError> {
        let query = json!({"bool": {"must": [{"term": {"index": index}}]}});
        let opts = SearchOpts {
            size: Some(size),
            sort: vec![json!({"timestamp": {"order": "desc"}})],
            ..SearchOpts::default()
        };
        let response = self.provider.search(&self.index, query, opts).await?;
        Ok(response.hits.into_iter().map(|hit| (hit.id, hit.source)).collect())
    }

    async fn most_recent(&self, index: &str) -> Result<Option<(String, Value)>, IndexError> {
        Ok(self.recent_messages(index, 1).await?.into_iter().next())
    }

    /// Attempt to take the build lock for an index.
    ///
    /// Multiple replicas may race past the initial check and all write a
    /// tentative claim. The backend converges on one write order; the
    /// claim at the old end of the contiguous tentative run wins.
    pub async fn acquire_reindex_lock(&self, job: &ReindexJob) -> Result<bool, IndexError> {
        self.ensure_index().await?;

        if let Some((_, source)) = self.most_recent(&job.index).await? {
            if lock_is_active(&source) {
                tracing::debug!(index = job.index.as_str(), "active lock held elsewhere");
                return Ok(false);
            }
        }

        let tentative_id = self.log_message(MessageType::ReindexLockTentative, job).await?;

        let recent = self.recent_messages(&job.index, RACE_WINDOW).await?;
        let mut oldest_tentative: Option<&str> = None;
        for (id, source) in &recent {
            if source.get("message_type").and_then(Value::as_str)
                != Some(MessageType::ReindexLockTentative.as_str())
            {
                break;
            }
            oldest_tentative = Some(id);
        }
        if let Some(winner) = oldest_tentative {
            if winner != tentative_id {
                tracing::debug!(index = job.index.as_str(), winner, "lost the reindex lock race");
                return Ok(false);
            }
        }

        self.log_message(MessageType::ReindexStarted, job).await?;
        Ok(true)
    }

    /// Refresh the heartbeat on the current lock. Returns false when no
    /// active lock exists, which means this writer has lost it.
    pub async fn refresh_reindex_lock(&self, index: &str) -> Result<bool, IndexError> {
        let Some((doc_id, source)) = self.most_recent(index).await? else {
            tracing::warn!(index, "no reindex lock to refresh");
            return Ok(false);
        };
        if !lock_is_active(&source) {
            tracing::warn!(index, "reindex lock expired before refresh");
            return Ok(false);
        }
        let heartbeat = json!({"heartbeat_timestamp": Utc::now().timestamp_millis()});
        self.provider
            .bulk_index(vec![BulkOp::Update {
                index: self.index.clone(),
                id: doc_id,
                doc: heartbeat,
            }])
            .await?;
        self.provider.refresh(&self.index).await?;
        Ok(true)
    }

    /// Release the lock by writing a terminal record.
    pub async fn release_reindex_lock(
        &self,
        job: &ReindexJob,
        success: bool,
    ) -> Result<(), IndexError> {
        if let Some((_, source)) = self.most_recent(&job.index).await? {
            if !lock_is_active(&source) {
                tracing::warn!(index = job.index.as_str(), "releasing a lock that is not active");
            }
        }
        let message_type = if success {
            MessageType::ReindexCompleted
        } else {
            MessageType::ReindexFailed
        };
        self.log_message(message_type, job).await?;
        Ok(())
    }

    /// Record that the alias swap happened.
    pub async fn log_rollover(&self, job: &ReindexJob) -> Result<(), IndexError> {
        self.log_message(MessageType::IndexAliasRolloverComplete, job).await?;
        Ok(())
    }
}

/// Whether the given most-recent record represents a live lock.
fn lock_is_active(source: &Value) -> bool {
    let message_type = source.get("message_type").and_then(Value::as_str);
    let locked = matches!(
        message_type,
        Some("reindex_lock_tentative") | Some("reindex_started")
    );
    if !locked {
        return false;
    }
    let timestamp = source
        .get("heartbeat_timestamp")
        .and_then(Value::as_i64)
        .or_else(|| source.get("timestamp").and_then(Value::as_i64));
    let Some(timestamp) = timestamp else { return false };
    let age = Utc::now().timestamp_millis().saturating_sub(timestamp);
    age < LOCK_EXPIRATION.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message_type: &str, age_ms: i64) -> Value {
        json!({
            "message_type": message_type,
            "timestamp": Utc::now().timestamp_millis() - age_ms,
        })
    }

    #[test]
    fn fresh_tentative_and_started_are_locks() {
        assert!(lock_is_active(&record("reindex_lock_tentative", 1000)));
        assert!(lock_is_active(&record("reindex_started", 1000)));
    }

    #[test]
    fn terminal_records_free_the_slot() {
        assert!(!lock_is_active(&record("reindex_completed", 0)));
        assert!(!lock_is_active(&record("reindex_failed", 0)));
        assert!(!lock_is_active(&record("index_alias_rollover_complete", 0)));
    }

    #[test]
    fn stale_heartbeat_expires() {
        let six_minutes = 6 * 60 * 1000;
        assert!(!lock_is_active(&record("reindex_started", six_minutes)));
        let mut doc = record("reindex_started", six_minutes);
        doc["heartbeat_timestamp"] = json!(Utc::now().timestamp_millis() - 1000);
        assert!(lock_is_active(&doc));
    }
}
