//! Node binary

use clap::{Parser, Subcommand};
use nodemesh::common::Config;
use nodemesh::{NodeId, NodeServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nodemesh-node")]
#[command(about = "nodemesh cluster node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Serve {
        /// Config file (defaults to $NODEMESH_CONFIG, then ./config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID (overrides the config file)
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP (overrides the config file)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Log level (overrides the config file)
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            bind,
            log_level,
        } => {
            // Load config from file, then override with CLI arguments
            let mut config = match config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            if let Some(id) = id {
                config.node_id = NodeId::new(id);
            }
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(level) = log_level {
                config.log_level = level;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            NodeServer::new(config).serve().await?;
        }
    }

    Ok(())
}
