use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dexflow")]
#[command(version)]
#[command(about = "Order routing and execution service with live status feeds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory (default.toml, $DEXFLOW_ENV.toml)
    #[arg(short, long, default_value = "config", env = "DEXFLOW_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API and the order workers (default)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply database migrations and exit
    Migrate,
    /// Delete jobs retained after a terminal failure
    PurgeFailed,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            host: None,
            port: None,
        }
    }
}
