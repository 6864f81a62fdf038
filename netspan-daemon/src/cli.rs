//! CLI argument definitions for netspan-daemon.

use std::path::PathBuf;

use clap::Parser;

/// HTTP traffic to OpenTelemetry span bridge.
///
/// Launches the network sensor, filters the HTTP transactions it reports
/// and exports the accepted ones as spans to an OTLP collector.
#[derive(Parser, Debug)]
#[command(name = "netspan-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the JSON settings file.
    #[arg(short, long, default_value = "mirror-settings.json")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the settings file and exit without starting the pipeline.
    #[arg(long)]
    pub validate: bool,
}
