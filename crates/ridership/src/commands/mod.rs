//! CLI commands

pub mod plan;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::Args;
use transit_ridership_core::pipeline::PipelineConfig;

use crate::error::CliError;

/// Arguments that locate and override the pipeline configuration
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Calendar years to extract
    #[arg(long, num_args = 1.., value_name = "YEAR")]
    pub years: Vec<i32>,

    /// Route codes to extract
    #[arg(long, num_args = 1.., value_name = "ROUTE")]
    pub routes: Vec<String>,

    /// Root directory for staging files and the final dataset
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the configuration file (if any) and apply command line overrides
    pub fn load(&self) -> Result<PipelineConfig, CliError> {
        let mut config = match self.config {
            Some(ref path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::new(),
        };

        if !self.years.is_empty() {
            config = config.with_years(self.years.clone());
        }
        if !self.routes.is_empty() {
            config = config.with_routes(self.routes.iter().cloned());
        }
        if let Some(ref base_path) = self.base_path {
            config = config.with_base_path(base_path);
        }
        Ok(config)
    }
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Ignore and clear the checkpoint; start from the first unit
    #[arg(long)]
    pub fresh: bool,

    /// Report the units that would be processed without fetching or writing
    #[arg(long)]
    pub dry_run: bool,

    /// Remove the staging directory after a successful consolidation
    #[arg(long)]
    pub clean_staging: bool,

    /// Skip the weather join
    #[arg(long)]
    pub no_weather: bool,

    /// Rows requested per page
    #[arg(long, value_name = "ROWS")]
    pub page_size: Option<usize>,

    /// Socrata application token
    #[arg(long, env = "SOCRATA_APP_TOKEN", hide_env_values = true)]
    pub app_token: Option<String>,
}

/// Arguments for the `plan` command
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Calendar years to plan
    #[arg(long, num_args = 1.., required = true, value_name = "YEAR")]
    pub years: Vec<i32>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}
