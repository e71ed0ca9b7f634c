//! # QQSync Bridge
//!
//! Standalone runner: connects to the OneBot endpoint, keeps member lists
//! current and serves group-side redemption. Player notices go to the log.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`QS_LOG_LEVEL`, then `RUST_LOG`, default `info`)
//! 2. Load configuration (`QS_CONFIG` file, then environment overrides)
//! 3. Open the binding store (JSON file when configured, else in memory)
//! 4. Start the bridge and wait for Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bridge_runtime::adapters::{
    InMemoryBindingStore, InMemoryDirectory, JsonFileBindingStore, LogNotifier,
};
use bridge_runtime::{BindingStore, Bridge, BridgeConfig, BridgePorts};

fn init_logging() {
    let filter = std::env::var("QS_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = BridgeConfig::load().context("Failed to load bridge configuration")?;

    let store: Arc<dyn BindingStore> = match &config.binding_store_path {
        Some(path) => Arc::new(
            JsonFileBindingStore::open(path.clone())
                .await
                .with_context(|| format!("Failed to open binding store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryBindingStore::new()),
    };
    let ports = BridgePorts {
        store,
        directory: Arc::new(InMemoryDirectory::new()),
        notifier: Arc::new(LogNotifier),
    };

    let mut bridge = Bridge::new(config, ports);
    bridge.start().await.context("Failed to start bridge")?;

    info!("Bridge is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    bridge.stop().await;
    Ok(())
}
