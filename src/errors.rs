//! Typed domain errors. Bootstrap/glue code (config loading, `main.rs`) uses `anyhow`;
//! these `thiserror` enums are for errors the caller is expected to branch on — HTTP
//! handlers convert them to `ProblemDetails` (see `api::error`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue store connection failed after retries: {0}")]
    ConnectionFailed(String),
    #[error("queue store operation failed: {0}")]
    Operation(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("text length out of bounds [{min}, {max}]")]
    TextLengthOutOfBounds { min: usize, max: usize },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
