//! The delta updater: plan how to move a dataset from its aliased version
//! to the declared one.
//!
//! The plan is either one full ingestion from the entities URL or an
//! ordered replay of delta streams. Anything going wrong during planning
//! falls back to a full build with a logged warning; a wrong plan must
//! never silently skip an update.

use std::collections::VecDeque;

use serde::Deserialize;
use serde_json::Value;

use index::ReindexType;
use model::Dataset;

use crate::error::IngestError;
use crate::loader::{fetch_json, LineSource};

/// A single entity change operation from a delta or full stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum OpKind {
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "MOD")]
    Mod,
    #[serde(rename = "DEL")]
    Del,
}

/// One record of the update stream.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityOp {
    pub op: OpKind,
    pub entity: Value,
}

/// The computed update plan for one dataset.
#[derive(Debug)]
pub struct DatasetUpdater {
    dataset: Dataset,
    base_version: Option<String>,
    force_full: bool,
    target_version: String,
    /// Ascending `(version, url)` pairs; `None` means full ingestion.
    delta_urls: Option<Vec<(String, String)>>,
}

#[derive(Deserialize)]
struct DeltaIndex {
    #[serde(default)]
    versions: std::collections::BTreeMap<String, String>,
}

impl DatasetUpdater {
    /// Fetch the delta index and decide a build strategy.
    pub async fn build(
        client: &reqwest::Client,
        dataset: &Dataset,
        base_version: Option<String>,
        force_full: bool,
        delta_updates: bool,
    ) -> DatasetUpdater {
        let mut updater = DatasetUpdater {
            dataset: dataset.clone(),
            base_version: base_version.clone(),
            force_full,
            target_version: dataset.version.clone().unwrap_or_else(|| "static".to_string()),
            delta_urls: None,
        };
        if force_full || !delta_updates {
            return updater;
        }
        let Some(delta_url) = &dataset.delta_url else {
            tracing::debug!(dataset = dataset.name.as_str(), "no delta updates available");
            return updater;
        };
        let Some(base) = base_version else { return updater };
        if updater.target_version <= base {
            return updater;
        }

        let delta_index = match fetch_json(client, delta_url).await {
            Ok(raw) => match serde_json::from_value::<DeltaIndex>(raw) {
                Ok(index) => index,
                Err(err) => {
                    tracing::warn!(
                        dataset = dataset.name.as_str(),
                        error = %err,
                        "malformed delta index, falling back to full ingestion"
                    );
                    return updater;
                }
            },
            Err(err) => {
                tracing::warn!(
                    dataset = dataset.name.as_str(),
                    error = %err,
                    "cannot fetch delta index, falling back to full ingestion"
                );
                return updater;
            }
        };

        let versions: Vec<&String> = delta_index.versions.keys().collect();
        let Some(oldest) = versions.first() else { return updater };
        // The base may predate the delta window; a version without its own
        // delta file is fine as long as it is inside the window.
        if base.as_str() < oldest.as_str() {
            tracing::warn!(
                dataset = dataset.name.as_str(),
                base_version = base.as_str(),
                target_version = updater.target_version.as_str(),
                "loaded version is older than the delta window"
            );
            return updater;
        }

        let selected: Vec<(String, String)> = delta_index
            .versions
            .iter()
            .filter(|(version, _)| **version > base && **version <= updater.target_version)
            .map(|(version, url)| (version.clone(), url.clone()))
            .collect();
        if let Some(newest) = versions.last() {
            updater.target_version = (*newest).clone();
        }
        updater.delta_urls = Some(selected);
        updater
    }

    /// Whether the plan replays deltas onto a clone of the current index.
    pub fn is_incremental(&self) -> bool {
        !self.force_full && self.delta_urls.is_some()
    }

    pub fn reindex_type(&self) -> ReindexType {
        if self.is_incremental() {
            ReindexType::Partial
        } else {
            ReindexType::Full
        }
    }

    pub fn target_version(&self) -> &str {
        &self.target_version
    }

    pub fn base_version(&self) -> Option<&str> {
        self.base_version.as_deref()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Whether any work is needed at all.
    pub fn needs_update(&self) -> bool {
        if !self.dataset.load {
            return false;
        }
        if self.dataset.entities_url.is_none() {
            if !self.dataset.is_collection() {
                tracing::warn!(
                    dataset = self.dataset.name.as_str(),
                    "dataset has no entities resource"
                );
            }
            return false;
        }
        if self.force_full {
            return true;
        }
        if let Some(delta_urls) = &self.delta_urls {
            if delta_urls.is_empty() {
                return false;
            }
        }
        if let Some(base) = &self.base_version {
            if self.target_version <= *base {
                return false;
            }
        }
        true
    }

    /// Open the stream of entity operations for this plan.
    pub fn stream(&self) -> Result<OpStream, IngestError> {
        let mut sources = VecDeque::new();
        match (&self.delta_urls, self.force_full) {
            (Some(urls), false) => {
                for (version, url) in urls {
                    sources.push_back(Source {
                        url: url.clone(),
                        label: format!("{}-delta-{}", self.dataset.name, version),
                        full: false,
                    });
                }
            }
            _ => {
                let url = self.dataset.entities_url.clone().ok_or_else(|| {
                    IngestError::Manifest(format!(
                        "no entities for dataset: {}",
                        self.dataset.name
                    ))
                })?;
                sources.push_back(Source {
                    url,
                    label: format!("{}-{}", self.dataset.name, self.target_version),
                    full: true,
                });
            }
        }
        Ok(OpStream { sources, current: None })
    }
}

struct Source {
    url: String,
    label: String,
    full: bool,
}

/// The concatenated stream of operations across all planned sources.
pub struct OpStream {
    sources: VecDeque<Source>,
    current: Option<(Source, LineSource)>,
}

impl OpStream {
    /// The next operation, or `None` when every source is exhausted.
    pub async fn next_op(
        &mut self,
        client: &reqwest::Client,
    ) -> Result<Option<EntityOp>, IngestError> {
        loop {
            if self.current.is_none() {
                let Some(source) = self.sources.pop_front() else { return Ok(None) };
                tracing::info!(source = source.label.as_str(), "loading entity stream");
                let lines = LineSource::open(client, &source.url).await?;
                self.current = Some((source, lines));
            }
            let (full, line) = {
                let (source, lines) = self.current.as_mut().expect("current source was just set");
                (source.full, lines.next_line().await?)
            };
            match line {
                None => {
                    self.current = None;
                    continue;
                }
                Some(line) if full => {
                    let entity: Value = serde_json::from_str(&line)?;
                    return Ok(Some(EntityOp { op: OpKind::Add, entity }));
                }
                Some(line) => return Ok(Some(serde_json::from_str(&line)?)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn client() -> reqwest::Client {
        crate::loader::build_client(&crate::loader::FetchSettings::default()).unwrap()
    }

    fn dataset(version: &str, delta_url: Option<String>) -> Dataset {
        let mut ds = Dataset::new("testset");
        ds.version = Some(version.to_string());
        ds.entities_url = Some("/tmp/entities.ftm.json".to_string());
        ds.delta_url = delta_url;
        ds
    }

    fn write_delta_index(versions: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let versions: serde_json::Map<String, Value> = versions
            .iter()
            .map(|(version, url)| (version.to_string(), Value::String(url.to_string())))
            .collect();
        write!(file, "{}", serde_json::json!({"versions": versions})).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn force_full_skips_deltas() {
        let file = write_delta_index(&[("2", "u2")]);
        let ds = dataset("2", Some(file.path().to_string_lossy().to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("1".to_string()), true, true).await;
        assert!(!updater.is_incremental());
        assert!(updater.needs_update());
        assert_eq!(updater.reindex_type(), ReindexType::Full);
    }

    #[tokio::test]
    async fn no_base_version_means_full() {
        let file = write_delta_index(&[("2", "u2")]);
        let ds = dataset("2", Some(file.path().to_string_lossy().to_string()));
        let updater = DatasetUpdater::build(&client(), &ds, None, false, true).await;
        assert!(!updater.is_incremental());
        assert!(updater.needs_update());
    }

    #[tokio::test]
    async fn plans_delta_window() {
        let file = write_delta_index(&[("1", "u1"), ("2", "u2"), ("3", "u3")]);
        let ds = dataset("3", Some(file.path().to_string_lossy().to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("1".to_string()), false, true).await;
        assert!(updater.is_incremental());
        assert_eq!(updater.reindex_type(), ReindexType::Partial);
        assert_eq!(updater.target_version(), "3");
        assert_eq!(
            updater.delta_urls.as_ref().unwrap(),
            &vec![("2".to_string(), "u2".to_string()), ("3".to_string(), "u3".to_string())]
        );
    }

    #[tokio::test]
    async fn base_older_than_window_means_full() {
        let file = write_delta_index(&[("5", "u5"), ("6", "u6")]);
        let ds = dataset("6", Some(file.path().to_string_lossy().to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("2".to_string()), false, true).await;
        assert!(!updater.is_incremental());
        assert!(updater.needs_update());
    }

    #[tokio::test]
    async fn up_to_date_dataset_needs_nothing() {
        let ds = dataset("3", None);
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("3".to_string()), false, true).await;
        assert!(!updater.needs_update());
    }

    #[tokio::test]
    async fn empty_delta_selection_needs_nothing() {
        // The base sits inside the window but no deltas are newer.
        let file = write_delta_index(&[("2", "u2"), ("3", "u3")]);
        let ds = dataset("3", Some(file.path().to_string_lossy().to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("3".to_string()), false, true).await;
        assert!(!updater.needs_update());
    }

    #[tokio::test]
    async fn unfetchable_delta_index_falls_back_to_full() {
        let ds = dataset("3", Some("/nonexistent/delta.json".to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("1".to_string()), false, true).await;
        assert!(!updater.is_incremental());
        assert!(updater.needs_update());
    }

    #[tokio::test]
    async fn disabled_dataset_needs_nothing() {
        let mut ds = dataset("3", None);
        ds.load = false;
        let updater = DatasetUpdater::build(&client(), &ds, None, false, true).await;
        assert!(!updater.needs_update());
    }

    #[tokio::test]
    async fn full_stream_yields_adds() {
        let mut entities = tempfile::NamedTempFile::new().unwrap();
        writeln!(entities, "{}", serde_json::json!({"id": "a", "schema": "Person"})).unwrap();
        writeln!(entities, "{}", serde_json::json!({"id": "b", "schema": "Person"})).unwrap();
        entities.flush().unwrap();

        let mut ds = dataset("1", None);
        ds.entities_url = Some(entities.path().to_string_lossy().to_string());
        let updater = DatasetUpdater::build(&client(), &ds, None, false, true).await;
        let mut stream = updater.stream().unwrap();
        let client = client();

        let first = stream.next_op(&client).await.unwrap().unwrap();
        assert_eq!(first.op, OpKind::Add);
        assert_eq!(first.entity["id"], "a");
        let second = stream.next_op(&client).await.unwrap().unwrap();
        assert_eq!(second.entity["id"], "b");
        assert!(stream.next_op(&client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delta_stream_carries_ops() {
        let mut delta = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            delta,
            "{}",
            serde_json::json!({"op": "MOD", "entity": {"id": "a", "schema": "Person"}})
        )
        .unwrap();
        writeln!(
            delta,
            "{}",
            serde_json::json!({"op": "DEL", "entity": {"id": "b", "schema": "Person"}})
        )
        .unwrap();
        delta.flush().unwrap();

        let index_file =
            write_delta_index(&[("2", delta.path().to_string_lossy().as_ref())]);
        let ds = dataset("2", Some(index_file.path().to_string_lossy().to_string()));
        let updater =
            DatasetUpdater::build(&client(), &ds, Some("1".to_string()), false, true).await;
        assert!(updater.is_incremental());

        let mut stream = updater.stream().unwrap();
        let client = client();
        let first = stream.next_op(&client).await.unwrap().unwrap();
        assert_eq!(first.op, OpKind::Mod);
        let second = stream.next_op(&client).await.unwrap().unwrap();
        assert_eq!(second.op, OpKind::Del);
        assert!(stream.next_op(&client).await.unwrap().is_none());
    }
}
