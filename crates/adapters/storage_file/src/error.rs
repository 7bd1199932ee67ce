//! Storage-specific error type wrapping file system errors.

use domo_domain::error::DomoError;

/// Errors originating from the file storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A read, write or rename failed.
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the entry set.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for DomoError {
    fn from(err: StoreError) -> Self {
        Self::Storage(Box::new(err))
    }
}
