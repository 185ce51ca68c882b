//! Tracing subscriber setup

use clap::ValueEnum;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `--verbose`; without either, only `info` and above is
/// printed. Logs go to stderr so command output on stdout stays clean.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore the error if a subscriber is already set
    let _ = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}
