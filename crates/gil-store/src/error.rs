//! Store error types.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the in-memory stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A response with this id was already appended.
    #[error("response {0} already recorded; the response log is append-only")]
    DuplicateResponse(Uuid),

    /// A snapshot file could not be read or written.
    #[error("snapshot {}: {reason}", path.display())]
    Snapshot { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn snapshot(path: &std::path::Path, reason: impl ToString) -> Self {
        StoreError::Snapshot {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
