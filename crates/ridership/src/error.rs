//! CLI error types

use thiserror::Error;
use transit_ridership_core::pipeline::PipelineError;

/// Errors surfaced to the terminal
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The run finished but some units failed
    #[error("{0} unit(s) failed; rerun to retry them")]
    UnitsFailed(usize),

    #[error("Failed to write output: {0}")]
    Output(String),
}

impl CliError {
    /// Message shown to the operator
    pub fn user_message(&self) -> String {
        match self {
            CliError::Pipeline(e) => e.user_message(),
            _ => self.to_string(),
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidArgument(_) => 2,
            CliError::Pipeline(
                PipelineError::ConfigError(_) | PipelineError::ConfigParse { .. },
            ) => 2,
            CliError::Pipeline(PipelineError::ResumeError(_)) => 3,
            CliError::UnitsFailed(_) => 4,
            _ => 1,
        }
    }
}
