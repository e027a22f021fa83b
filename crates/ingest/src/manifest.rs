//! The dataset manifest and catalog resolution.
//!
//! The manifest is a YAML document naming datasets directly and optionally
//! pointing at an external catalog: a JSON index published alongside the
//! data that carries the current version, entity URL, and delta index URL
//! for every dataset. Resolution merges both into one [`Catalog`].

use serde::Deserialize;
use serde_json::Value;

use model::{iso_to_version, Catalog, Dataset};

use crate::error::IngestError;
use crate::loader::{fetch_json, fetch_yaml};

/// An external catalog reference inside the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalCatalog {
    pub url: String,
    /// The collection within the external catalog this deployment serves.
    pub scope: String,
}

/// The parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub external: Option<ExternalCatalog>,
    /// Auth token sent to the data host when fetching catalogs and streams.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

impl Manifest {
    /// Load and parse the manifest from a path or URL.
    pub async fn load(client: &reqwest::Client, location: &str) -> Result<Manifest, IngestError> {
        let raw = fetch_yaml(client, location).await?;
        serde_yaml::from_value(raw)
            .map_err(|err| IngestError::Manifest(format!("cannot parse manifest: {err}")))
    }

    /// Resolve the manifest into the catalog of datasets: the external
    /// catalog first, then inline datasets, which override on name clash.
    pub async fn resolve(&self, client: &reqwest::Client) -> Result<Catalog, IngestError> {
        let mut catalog = Catalog::default();
        if let Some(external) = &self.external {
            let raw = fetch_json(client, &external.url).await?;
            merge_external(&mut catalog, &raw, &external.scope)?;
        }
        for dataset in &self.datasets {
            catalog.insert(dataset.clone());
        }
        if catalog.is_empty() {
            return Err(IngestError::Manifest("manifest resolves to no datasets".into()));
        }
        Ok(catalog)
    }
}

/// Fold an external catalog document into the catalog.
fn merge_external(catalog: &mut Catalog, raw: &Value, scope: &str) -> Result<(), IngestError> {
    let datasets = raw["datasets"]
        .as_array()
        .ok_or_else(|| IngestError::Manifest("external catalog has no datasets".into()))?;
    let mut scope_seen = false;
    for spec in datasets {
        let Some(name) = spec["name"].as_str() else { continue };
        let mut dataset = Dataset::new(name);
        dataset.title = spec["title"].as_str().map(str::to_string);
        dataset.version = dataset_version(spec);
        dataset.delta_url = spec["delta_url"].as_str().map(str::to_string);
        dataset.entities_url = entities_url(spec);
        for key in ["sources", "externals", "children", "datasets"] {
            if let Some(children) = spec[key].as_array() {
                for child in children.iter().filter_map(Value::as_str) {
                    if !dataset.children.contains(&child.to_string()) {
                        dataset.children.push(child.to_string());
                    }
                }
            }
        }
        if name == scope {
            scope_seen = true;
        }
        catalog.insert(dataset);
    }
    if !scope_seen {
        tracing::warn!(scope, "external catalog does not contain the configured scope");
    }
    Ok(())
}

fn dataset_version(spec: &Value) -> Option<String> {
    if let Some(version) = spec["version"].as_str() {
        return Some(version.to_string());
    }
    let export = spec["last_export"].as_str().or_else(|| spec["updated_at"].as_str())?;
    iso_to_version(export).ok()
}

fn entities_url(spec: &Value) -> Option<String> {
    if let Some(url) = spec["entities_url"].as_str() {
        return Some(url.to_string());
    }
    let resources = spec["resources"].as_array()?;
    resources.iter().find_map(|resource| {
        let path = resource["path"].as_str().or_else(|| resource["name"].as_str())?;
        if path == "entities.ftm.json" {
            resource["url"].as_str().map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_external_catalog() {
        let raw = json!({
            "datasets": [
                {
                    "name": "default",
                    "title": "Consolidated screening list",
                    "last_export": "2024-03-01T12:00:00Z",
                    "sources": ["eu_fsf"],
                    "externals": ["us_ofac"],
                    "resources": [
                        {"path": "entities.ftm.json", "url": "https://data.example.com/default/entities.ftm.json"},
                        {"path": "targets.csv", "url": "https://data.example.com/default/targets.csv"}
                    ],
                    "delta_url": "https://data.example.com/default/delta.json"
                },
                {"name": "eu_fsf", "title": "EU list", "version": "20240301000000"}
            ]
        });
        let mut catalog = Catalog::default();
        merge_external(&mut catalog, &raw, "default").unwrap();

        let default = catalog.get("default").unwrap();
        assert_eq!(default.version.as_deref(), Some("20240301120000"));
        assert_eq!(
            default.entities_url.as_deref(),
            Some("https://data.example.com/default/entities.ftm.json")
        );
        assert_eq!(default.children, vec!["eu_fsf".to_string(), "us_ofac".to_string()]);
        assert!(default.delta_url.is_some());
        assert!(catalog.get("eu_fsf").is_some());
    }

    #[test]
    fn manifest_yaml_parses() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
schedule: "23 * * * *"
external:
  url: https://data.example.com/index.json
  scope: default
datasets:
  - name: local_extra
    title: Local additions
    entities_url: file:///data/extra.ftm.json
    version: "20240101000000"
"#,
        )
        .unwrap();
        assert_eq!(manifest.schedule.as_deref(), Some("23 * * * *"));
        assert_eq!(manifest.external.as_ref().unwrap().scope, "default");
        assert_eq!(manifest.datasets.len(), 1);
        assert_eq!(manifest.datasets[0].name, "local_extra");
        assert!(manifest.datasets[0].load);
    }
}
