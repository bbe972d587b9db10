//! Error types for the local store and the offline cache.

use crate::models::{Table, ValidationError};
use crate::repo::LocalId;

/// Failure inside local persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {id} not found in {table}")]
    NotFound { table: Table, id: LocalId },

    #[error("local schema version {found} is newer than the supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("invalid record: {0}")]
    Invalid(#[from] ValidationError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure of a cache operation that touches both the local store and the remote.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Local(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[source] E),
}
