//! Versioned index naming.
//!
//! Concrete entity indices are named
//! `{prefix}-entities-{dataset}-{software}{version}` where `software` is a
//! three-character deployment code followed by digits derived from the
//! model crate version. The software part changes on mapping-breaking
//! releases, so old indices are never mistaken for current ones. The plain
//! `{prefix}-entities` name is the query alias.

use crate::error::IndexError;

/// Digits derived from the model crate version, two per component.
/// `0.1.0` becomes `000100`.
pub fn schema_digits() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let mut digits = String::with_capacity(6);
    for part in version.split('.').take(3) {
        let n: u32 = part.parse().unwrap_or(0);
        digits.push_str(&format!("{:02}", n.min(99)));
    }
    while digits.len() < 6 {
        digits.push('0');
    }
    digits
}

/// Computes and parses the names of entity indices for one deployment.
#[derive(Debug, Clone)]
pub struct IndexNaming {
    entity_index: String,
    audit_index: String,
    software: String,
}

impl IndexNaming {
    /// Build a naming scheme from the configured index name and the
    /// three-character index version code.
    pub fn new(index_name: &str, index_version: &str) -> Result<IndexNaming, IndexError> {
        if index_name.is_empty() || index_name.contains('-') {
            return Err(IndexError::invalid(format!(
                "index name must be non-empty and free of dashes: {index_name:?}"
            )));
        }
        if index_version.len() != 3 {
            return Err(IndexError::invalid(format!(
                "index version must be 3 characters: {index_version:?}"
            )));
        }
        let entity_index = format!("{index_name}-entities");
        Ok(IndexNaming {
            audit_index: format!("{entity_index}-audit-log"),
            entity_index,
            software: format!("{index_version}{}-", schema_digits()),
        })
    }

    /// The query alias every search runs against.
    pub fn alias(&self) -> &str {
        &self.entity_index
    }

    /// The audit-log index name.
    pub fn audit_index(&self) -> &str {
        &self.audit_index
    }

    /// Prefix of every concrete index for a dataset, used for rollover.
    pub fn dataset_prefix(&self, dataset: &str) -> String {
        format!("{}-{}-", self.entity_index, dataset)
    }

    /// The concrete index name for a dataset at a version.
    pub fn index_for(&self, dataset: &str, version: &str) -> Result<String, IndexError> {
        if dataset.is_empty() {
            return Err(IndexError::invalid("dataset name must not be empty"));
        }
        if version.is_empty() {
            return Err(IndexError::invalid("dataset version must not be empty"));
        }
        Ok(format!("{}-{}-{}{}", self.entity_index, dataset, self.software, version))
    }

    /// Split a concrete index name into `(dataset, version)`.
    ///
    /// Fails for indices of other deployments or older software codes, so
    /// stale indices are simply not recognized as current.
    pub fn parse(&self, index: &str) -> Result<(String, String), IndexError> {
        let rest = index
            .strip_prefix(&self.entity_index)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| IndexError::invalid(format!("foreign index name: {index}")))?;
        let (dataset, versioned) = rest
            .split_once('-')
            .ok_or_else(|| IndexError::invalid(format!("unversioned index name: {index}")))?;
        let version = versioned
            .strip_prefix(&self.software)
            .ok_or_else(|| IndexError::invalid(format!("different software version: {index}")))?;
        if version.is_empty() {
            return Err(IndexError::invalid(format!("empty dataset version: {index}")));
        }
        Ok((dataset.to_string(), version.to_string()))
    }

    /// Find the aliased version of a dataset among the alias members.
    pub fn aliased_version(&self, aliased: &[String], dataset: &str) -> Option<String> {
        aliased
            .iter()
            .filter_map(|index| self.parse(index).ok())
            .find(|(parsed, _)| parsed == dataset)
            .map(|(_, version)| version)
    }
}
