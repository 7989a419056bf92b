use anyhow::{anyhow, Context};
use clap::Parser;
use dexflow::adapters::PostgresStore;
use dexflow::cli::{Cli, Commands};
use dexflow::config::{AppConfig, DatabaseConfig};
use dexflow::persistence::JobStore;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    init_logging(&config.logging);

    match cli.command.unwrap_or_default() {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await?;
            println!("Migrations applied");
        }
        Commands::PurgeFailed => {
            let store = connect(&config).await?;
            let purged = store.purge_failed().await?;
            info!(purged, "Purged failed jobs");
            println!("Purged {} failed jobs", purged);
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<PostgresStore> {
    let DatabaseConfig {
        url,
        max_connections,
    } = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("database.url is not configured (set DEXFLOW__DATABASE__URL)"))?;

    PostgresStore::new(url, *max_connections)
        .await
        .context("failed to connect to PostgreSQL")
}
