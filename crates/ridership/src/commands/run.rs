//! The `run` command

use transit_ridership_core::pipeline::{PipelineConfig, PipelineExecutor};

use super::RunArgs;
use crate::error::CliError;

/// Build the run configuration from the arguments
pub fn build_config(args: &RunArgs) -> Result<PipelineConfig, CliError> {
    let mut config = args
        .config
        .load()?
        .with_dry_run(args.dry_run)
        .with_clean_staging(args.clean_staging);

    if args.fresh {
        config = config.with_resume(false);
    }
    if args.no_weather {
        config = config.with_weather_enabled(false);
    }
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size);
    }
    if args.app_token.is_some() {
        config = config.with_app_token(args.app_token.clone());
    }
    Ok(config)
}

/// Handle the `run` command
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let config = build_config(args)?;
    let mut executor = PipelineExecutor::new(config)?;

    eprintln!("Starting pipeline run: {}", executor.run_id());

    let report = executor.run()?;
    report.print_summary();

    if report.is_success() {
        eprintln!();
        eprintln!("Pipeline completed successfully!");
        Ok(())
    } else {
        Err(CliError::UnitsFailed(report.failed_units().count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ConfigArgs;

    fn args() -> RunArgs {
        RunArgs {
            config: ConfigArgs {
                years: vec![2024],
                routes: vec!["M15".to_string()],
                ..Default::default()
            },
            fresh: false,
            dry_run: false,
            clean_staging: false,
            no_weather: false,
            page_size: None,
            app_token: None,
        }
    }

    #[test]
    fn test_defaults_resume() {
        let config = build_config(&args()).unwrap();
        assert!(config.resume);
        assert!(config.weather.enabled);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_flags_applied() {
        let mut args = args();
        args.fresh = true;
        args.no_weather = true;
        args.dry_run = true;
        args.page_size = Some(1000);

        let config = build_config(&args).unwrap();
        assert!(!config.resume);
        assert!(!config.weather.enabled);
        assert!(config.dry_run);
        assert_eq!(config.ridership.page_size, 1000);
    }
}
