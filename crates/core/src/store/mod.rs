//! Durable storage: the progress checkpoint and weekly artifacts
//!
//! Every file here is replaced wholesale by writing a sibling temporary
//! file, syncing it and renaming it over the target, so a reader never
//! observes a partially written checkpoint or artifact, even after a crash.

mod artifacts;
mod atomic;
mod parquet_io;
mod progress;

use std::path::PathBuf;

use thiserror::Error;

pub use artifacts::{StoredArtifact, WeeklyUnitStore};
pub use parquet_io::{read_parquet, write_parquet_atomic, writer_properties};
pub use progress::{ProgressState, ProgressStore};

/// Errors from the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error with path context
    #[error("IO error with {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint serialization error
    #[error("Checkpoint error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Parquet encoding or decoding error
    #[error("Parquet error in {path}: {message}")]
    Parquet { path: PathBuf, message: String },

    /// File name does not follow the artifact naming scheme
    #[error("Not an artifact file name: {0}")]
    InvalidArtifactName(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid file pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parquet(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parquet {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
