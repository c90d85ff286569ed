//! Drowsiness Monitor - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_logging(settings.logging.json)?;

    info!("=== Cabin Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        model = %settings.identity.model,
        database = settings.storage.database_url.as_deref().unwrap_or("memory"),
        "Starting drowsiness monitor..."
    );

    run_server(settings).await
}
