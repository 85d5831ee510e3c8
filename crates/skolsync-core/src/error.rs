use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the sync engine's own plumbing (storage, config).
///
/// Remote API failures never surface here; they are projected into
/// [`crate::state::ErrorInfo`] on the resource they belong to.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Storage I/O failed for {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync engine has shut down")]
    EngineClosed,
}

pub type Result<T> = std::result::Result<T, SyncError>;
