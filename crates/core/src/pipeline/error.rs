//! Error types for pipeline operations
//!
//! Per-unit failures (fetch, typing, artifact and checkpoint writes) are
//! captured as unit outcomes and never abort a run. The errors below abort
//! a run only at startup (configuration, resume) or during consolidation.

use std::path::PathBuf;

use thiserror::Error;

use crate::consolidate::ConsolidationError;
use crate::fetch::FetchError;
use crate::schema::SchemaError;
use crate::store::StoreError;

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration file could not be parsed
    #[error("Invalid configuration{}: {message}", location_suffix(.path))]
    ConfigParse {
        path: Option<PathBuf>,
        message: String,
    },

    /// Resume error
    #[error("Cannot resume from checkpoint: {0}")]
    ResumeError(String),

    /// The executor already reached its terminal state
    #[error("Pipeline run {0} has already finished")]
    AlreadyFinished(String),

    /// Remote fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Batch typing error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Checkpoint or artifact storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Consolidation error
    #[error("Consolidation error: {0}")]
    Consolidation(#[from] ConsolidationError),

    /// IO error with path context
    #[error("IO error with {path}: {message}")]
    IoErrorWithPath {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },
}

fn location_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create an IO error with path context
    pub fn io_with_path(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::IoErrorWithPath {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Fetch(e) => e.is_recoverable(),
            PipelineError::Store(StoreError::Io { .. }) | PipelineError::IoErrorWithPath { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check the --years and --routes arguments or your configuration file."
                )
            }
            PipelineError::ConfigParse { .. } => {
                format!("{self}\n\nHint: Check the TOML syntax and field names.")
            }
            PipelineError::ResumeError(msg) => {
                format!(
                    "Cannot resume: {msg}\n\nHint: Run the pipeline from the beginning with --fresh."
                )
            }
            PipelineError::Store(StoreError::Json { path, .. }) => {
                format!(
                    "Checkpoint {} is unreadable.\n\nHint: Remove it or run with --fresh to start over.",
                    path.display()
                )
            }
            PipelineError::Fetch(e) if e.is_recoverable() => {
                format!("{e}\n\nHint: The remote service may be unavailable; try again later.")
            }
            _ => self.to_string(),
        }
    }
}
