use thiserror::Error;

/// Errors surfaced at the search layer boundary.
///
/// The first three variants are reified so that the HTTP layer can map them
/// to precise status codes; everything else is a backend failure.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A requested index, document, or alias does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying index is absent where a query expected it. This
    /// distinguishes a misconfigured prefix from a first boot that is
    /// still ingesting.
    #[error("index not ready: {0}")]
    IndexNotReady(String),

    /// The request itself is malformed (bad query syntax, bad parameters).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Transport or server-side failure in the search backend.
    #[error("search backend error: {0}")]
    Backend(String),
}

impl IndexError {
    pub fn backend(msg: impl Into<String>) -> IndexError {
        IndexError::Backend(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> IndexError {
        IndexError::Invalid(msg.into())
    }
}
