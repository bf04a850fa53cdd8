use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tallyd::api::{start_server, AppState, Metrics, ServerConfig};
use tallyd::contracts::validate_key;
use tallyd::storage::RocksDbStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tallyd=info".parse()?))
        .init();

    tracing::info!("tallyd starting...");

    let data_dir = std::env::var("TALLYD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let store = Arc::new(RocksDbStore::open(&data_dir)?);
    tracing::info!("Opened counter store at {}", data_dir);

    let store_timeout = std::env::var("TALLYD_STORE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(2000));

    let default_key = std::env::var("TALLYD_DEFAULT_KEY").unwrap_or_else(|_| "index.html".into());
    // A blank default key would turn every GET /hits into a 400.
    validate_key(&default_key)?;

    let state = Arc::new(AppState::new(
        store,
        Arc::new(Metrics::new()),
        store_timeout,
        default_key,
    ));

    let config = ServerConfig::from_env();
    start_server(config, state, shutdown_signal()).await?;

    tracing::info!("tallyd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
