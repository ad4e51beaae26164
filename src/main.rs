//! swarmd entry point

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swarmd::cli::{Cli, Command};
use swarmd::config::Config;
use swarmd::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { instances, workers } => {
            let orchestrator = Arc::new(Orchestrator::new(config));
            orchestrator.start(instances).await?;
            if let Some(workers) = workers {
                orchestrator.ensure_workers(workers).await;
            }

            info!("swarmd running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;

            orchestrator.stop().await;
        }
    }

    Ok(())
}
