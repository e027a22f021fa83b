use thiserror::Error;

/// Errors raised while loading catalogs and building indices.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("model error: {0}")]
    Model(#[from] model::ModelError),

    #[error("index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Fetch(err.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}
