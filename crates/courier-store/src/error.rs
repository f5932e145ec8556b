use thiserror::Error;

use courier_shared::SyncError;

use crate::path::StorePath;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or rejected the request.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The backend's access rules refused the operation.
    #[error("Permission denied at {0}")]
    PermissionDenied(StorePath),

    /// A path segment was empty or contained a reserved character.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A record did not have the expected shape.
    #[error("Record codec error: {0}")]
    Codec(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O error (credential files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Credential keys are restricted to `[A-Za-z0-9_-]`.
    #[error("Invalid credential key: {0}")]
    InvalidKey(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("Lock poisoned")]
    Poisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied(path) => SyncError::Permission(path.to_string()),
            other => SyncError::Remote(other.to_string()),
        }
    }
}
