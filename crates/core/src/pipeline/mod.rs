//! Resumable weekly extraction pipeline
//!
//! Orchestrates, for every weekly unit of the configured years:
//! - Paginated ridership download for each configured route
//! - Calendar, holiday and weather enrichment
//! - Typing against the ridership schema
//! - An atomic per-unit Parquet artifact followed by a checkpoint update
//!
//! and finally consolidates all artifacts into one dataset partitioned by
//! year and route.
//!
//! # Example
//!
//! ```rust,ignore
//! use transit_ridership_core::pipeline::{PipelineConfig, PipelineExecutor};
//!
//! let config = PipelineConfig::new()
//!     .with_years(vec![2023, 2024])
//!     .with_routes(["M15", "B46"])
//!     .with_base_path("data");
//!
//! let mut executor = PipelineExecutor::new(config)?;
//! let report = executor.run()?;
//!
//! println!("Pipeline completed in {}", report.duration_formatted());
//! ```
//!
//! # Checkpointing
//!
//! `<base_path>/_tmp/progress.json` holds the highest completed global unit
//! index. A rerun with the same years and routes continues after it; a run
//! with `resume` disabled starts from the first unit.
//!
//! # Dry Run
//!
//! ```rust,ignore
//! let config = PipelineConfig::new()
//!     .with_years(vec![2024])
//!     .with_routes(["M15"])
//!     .with_dry_run(true);
//!
//! // Reports the units that would be processed; nothing is fetched or written
//! let report = PipelineExecutor::new(config)?.run()?;
//! ```

mod config;
mod error;
mod executor;
mod status;

pub use config::{HolidayConfig, PipelineConfig, RidershipApiConfig, WeatherApiConfig};
pub use error::{PipelineError, PipelineResult};
pub use executor::{PipelineExecutor, PipelineReport, PipelineState, UnitOutcome, UnitReport};
pub use status::StatusSnapshot;

/// Run a pipeline with the given configuration
///
/// This is a convenience function for simple pipeline execution.
#[cfg(feature = "http-source")]
pub fn run_pipeline(config: PipelineConfig) -> PipelineResult<PipelineReport> {
    let mut executor = PipelineExecutor::new(config)?;
    executor.run()
}

#[cfg(all(test, feature = "http-source"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_pipeline_dry_run() {
        let temp = TempDir::new().unwrap();

        let config = PipelineConfig::new()
            .with_years(vec![2024])
            .with_routes(["M15"])
            .with_base_path(temp.path())
            .with_dry_run(true);

        let report = run_pipeline(config).unwrap();
        assert!(report.is_success());
        assert!(report.units.iter().all(|u| u.outcome == UnitOutcome::Planned));
        assert!(!temp.path().join("_tmp").exists());
    }
}
