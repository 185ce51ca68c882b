//! `ridership` - weekly transit ridership extraction from the terminal

mod commands;
mod error;
mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{ConfigArgs, PlanArgs, RunArgs};
use crate::logging::LogFormat;

#[derive(Parser)]
#[command(name = "ridership")]
#[command(version)]
#[command(about = "Extract, enrich and consolidate weekly transit ridership", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, enrich and store every weekly unit, then consolidate
    Run(RunArgs),
    /// Show checkpoint, staged artifacts and final dataset state
    Status(ConfigArgs),
    /// List the weekly units for the given years
    Plan(PlanArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_format);

    let result = match cli.command {
        Commands::Run(args) => commands::run::handle_run(&args),
        Commands::Status(args) => commands::status::handle_status(&args),
        Commands::Plan(args) => commands::plan::handle_plan(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "ridership",
            "run",
            "--years",
            "2023",
            "2024",
            "--routes",
            "M15",
            "B46",
            "--fresh",
            "--verbose",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config.years, vec![2023, 2024]);
        assert_eq!(args.config.routes, vec!["M15", "B46"]);
        assert!(args.fresh);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_json_log_format() {
        let cli =
            Cli::try_parse_from(["ridership", "--log-format", "json", "plan", "--years", "2024"])
                .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
