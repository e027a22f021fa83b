use thiserror::Error;

/// Errors produced while constructing or validating model objects.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The schema tag is not part of the taxonomy.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// An entity payload could not be interpreted.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// A dataset or catalog descriptor could not be interpreted.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
}
