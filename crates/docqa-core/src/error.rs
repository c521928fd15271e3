use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Batch length mismatch: {chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns the typed error carried by an `anyhow::Error`, if any.
pub fn as_domain(err: &anyhow::Error) -> Option<&Error> {
    err.downcast_ref::<Error>()
}
