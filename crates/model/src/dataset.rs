//! Datasets and the catalog.
//!
//! A dataset descriptor names a source of entities (a newline-delimited
//! JSON stream), its current version, and optionally an index of delta
//! files. A composite dataset ("collection") names its children instead of
//! carrying data itself; queries scoped to a collection filter on the
//! children.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A curated source of entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Whether the ingester should load this dataset at all.
    #[serde(default = "default_load")]
    pub load: bool,
    /// Current version. Versions compare lexicographically, so they must be
    /// timestamp-like (`20240301120000`).
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub entities_url: Option<String>,
    /// URL of a JSON object mapping versions to delta-stream URLs.
    #[serde(default)]
    pub delta_url: Option<String>,
    /// Child dataset names for a collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

fn default_load() -> bool {
    true
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Dataset {
        Dataset {
            name: name.into(),
            title: None,
            load: true,
            version: None,
            entities_url: None,
            delta_url: None,
            children: Vec::new(),
        }
    }

    /// Whether this dataset aggregates others rather than carrying data.
    pub fn is_collection(&self) -> bool {
        !self.children.is_empty()
    }

    /// The dataset names a query scoped to this dataset filters on.
    pub fn scope_names(&self) -> Vec<String> {
        let mut names = self.children.clone();
        if !names.contains(&self.name) {
            names.push(self.name.clone());
        }
        names
    }
}

/// The ordered set of datasets the service knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub datasets: BTreeMap<String, Dataset>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.name.clone(), dataset);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Convert an RFC 3339 export timestamp into a sortable version string.
///
/// `2024-03-01T12:00:00Z` becomes `20240301120000`. Returns an error when
/// the value contains no usable digits.
pub fn iso_to_version(value: &str) -> Result<String, ModelError> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).take(14).collect();
    if digits.len() < 8 {
        return Err(ModelError::InvalidDataset(format!(
            "not a timestamp-like version: {value:?}"
        )));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_of_plain_dataset_is_itself() {
        let ds = Dataset::new("us_ofac");
        assert_eq!(ds.scope_names(), vec!["us_ofac".to_string()]);
    }

    #[test]
    fn scope_of_collection_includes_children() {
        let mut ds = Dataset::new("default");
        ds.children = vec!["eu_fsf".into(), "us_ofac".into()];
        let names = ds.scope_names();
        assert!(names.contains(&"eu_fsf".to_string()));
        assert!(names.contains(&"us_ofac".to_string()));
        assert!(names.contains(&"default".to_string()));
    }

    #[test]
    fn version_from_iso_timestamp() {
        assert_eq!(iso_to_version("2024-03-01T12:00:00Z").unwrap(), "20240301120000");
        assert_eq!(iso_to_version("2024-03-01").unwrap(), "20240301");
        assert!(iso_to_version("latest").is_err());
    }
}
