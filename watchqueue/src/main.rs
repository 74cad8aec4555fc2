//! watchqueue server entry point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use watchqueue_core::{
    bootstrap::{init_database, init_services, load_config},
    logging::init_logging,
    provider::DirectUrlProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting watchqueue server"
    );

    let pool = init_database(&config).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../migrations").run(&pool).await?;
    info!("Database migrations complete");

    let services = init_services(pool, &config, Arc::new(DirectUrlProvider));

    info!("Server ready");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    services.hub.shutdown();

    Ok(())
}
