//! Fatigue Monitor - Main Entry Point
//!
//! Usage: `fatigue-monitor [config.toml]`

use anyhow::{anyhow, Context};
use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let config = AppConfig::load(path.as_deref()).context("failed to load configuration")?;

    init_logging(&config.server).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    info!("=== Fatigue Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Detector models: {} (search: {:?})",
        config.detector.default_model, config.detector.model_dirs
    );

    run_server(config).await.map_err(|e| anyhow!(e))?;

    Ok(())
}
