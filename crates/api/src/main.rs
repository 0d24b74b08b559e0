//! Driver Risk Engine - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional settings file as the only argument
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref()).context("failed to load settings")?;

    init_logging(&settings.server)?;
    info!("=== Driver Risk Engine v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(settings).await.context("server failed")?;
    Ok(())
}
