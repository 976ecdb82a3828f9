use anyhow::Result;
use clap::Parser;

use befw_daemon::cli::DaemonCli;
use befw_daemon::logging;
use befw_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = orchestrator::load_config(&cli).await?;

    if cli.validate {
        println!("{}", serde_json::to_string_pretty(&config)?);
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "befw-daemon starting"
    );

    let mut orchestrator = Orchestrator::from_config(config)?;
    orchestrator.run().await?;

    tracing::info!("befw-daemon shut down");
    Ok(())
}
