use anyhow::Result;
use clap::Parser;
use tracing::instrument::WithSubscriber;

use netspan_core::config::NetspanConfig;
use netspan_daemon::cli::DaemonCli;
use netspan_daemon::logging;
use netspan_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // env override warnings are emitted during load
    let mut config = NetspanConfig::load(&cli.config)
        .with_subscriber(logging::bootstrap()?)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;

    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    let orchestrator = Orchestrator::build(config)?;
    let report = orchestrator.run().await?;

    tracing::info!(
        report = %serde_json::to_string(&report)?,
        "final pipeline counters"
    );
    Ok(())
}
