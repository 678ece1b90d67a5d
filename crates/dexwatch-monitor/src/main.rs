//! dexwatch monitor entry point.
//!
//! Backfills resting offers, then streams the ledger's transaction feed,
//! reconciling offers into SQLite and serving windowed pair analytics.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Ledger DEX offer monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DEXWATCH_CONFIG)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connection
    dexwatch_ws::init_crypto();

    let args = Args::parse();

    dexwatch_telemetry::init_logging()?;

    info!("starting dexwatch monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config.or_else(|| std::env::var("DEXWATCH_CONFIG").ok()) {
        Some(path) => {
            info!(config_path = %path, "loading configuration");
            dexwatch_monitor::AppConfig::from_file(&path)?
        }
        None => dexwatch_monitor::AppConfig::load()?,
    };
    info!(ws_url = %config.ws_url, db_path = %config.db_path, "configuration loaded");

    let app = dexwatch_monitor::Application::new(config)?;
    app.run().await?;

    Ok(())
}
