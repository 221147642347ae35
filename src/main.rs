//! DeBounty Server
//!
//! Companies post rewarded issues, hunters propose solutions

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use debounty::{Config, Ledger, LedgerStorage};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "debounty-server")]
#[command(version)]
#[command(about = "DeBounty - bounty marketplace ledger", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Host to bind (overrides config)
    #[arg(long, env = "DEBOUNTY_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "DEBOUNTY_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(long, env = "DEBOUNTY_DB")]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);

    info!("Starting DeBounty server");

    let ledger = match cli.db.or(config.storage.path) {
        Some(path) => {
            let storage = LedgerStorage::new(&path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Ledger::with_storage(config.ledger, storage).context("Failed to load ledger")?
        }
        None => {
            info!("No database configured, ledger is in-memory only");
            Ledger::new(config.ledger)
        }
    };

    debounty::server::run_server(&host, port, Arc::new(ledger)).await?;

    Ok(())
}
