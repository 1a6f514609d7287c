//! # LotGame Indexer Service
//!
//! Long-running process that backfills the configured block range, then follows the
//! chain live, writing every LotGame event into PostgreSQL.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin lot_indexer              # reads ./Config.toml
//! cargo run --bin lot_indexer -- my.toml   # explicit config file
//! ```
//!
//! Exits non-zero when ingestion terminates on a fatal error. Ctrl+C stops it cleanly.

use anyhow::{Context, Result};
use lot_event_indexer::{orchestrator::Orchestrator, settings::Settings};
use std::env;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // 1. Load settings
    let settings = match env::args().nth(1) {
        Some(path) => Settings::from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path))?,
        None => Settings::new().context("failed to load Config.toml")?,
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log.level.as_str()),
    )
    .init();

    log::info!("🚀 Starting LotGame indexer");

    // 2. Bootstrap: node, database, schema
    let mut orchestrator = Orchestrator::bootstrap(&settings)
        .await
        .context("bootstrap failed")?;
    log::info!("✅ Bootstrap complete");

    // 3. Backfill + live until a fatal error or Ctrl+C
    tokio::select! {
        result = orchestrator.run() => {
            result.context("ingestion terminated")?;
        }
        _ = signal::ctrl_c() => {
            log::info!("🛑 Shutdown signal received, stopping indexer");
        }
    }

    Ok(())
}
