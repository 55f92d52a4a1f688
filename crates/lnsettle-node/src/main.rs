//! lnsettle node entry point.
//!
//! Runs two settlement peers from a TOML configuration file or defaults.

mod config;
mod node;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::NodeConfig;
use node::SimulationNode;

/// lnsettle node
#[derive(Parser, Debug)]
#[command(name = "lnsettle-node", version, about = "Interledger settlement over Lightning")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "lnsettle.toml")]
    config: PathBuf,

    /// Override the number of rounds (0 runs until interrupted).
    #[arg(long)]
    rounds: Option<u32>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        let config = NodeConfig::default();
        config.save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = NodeConfig::load(&args.config)?;
    if let Some(rounds) = args.rounds {
        config.simulation.rounds = rounds;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json {
        config.logging.format = "json".into();
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("lnsettle node v{}", env!("CARGO_PKG_VERSION"));

    let mut node = SimulationNode::new(config)?;
    node.start().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "simulation error");
            }
        }
        _ = shutdown => {
            tracing::info!("initiating graceful shutdown");
        }
    }

    node.shutdown().await?;
    tracing::info!("lnsettle node exited cleanly");
    Ok(())
}
