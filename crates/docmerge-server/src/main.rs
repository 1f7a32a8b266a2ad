//! API Server Binary Entry Point

use anyhow::Context;
use docmerge_server::{start_server, ApiState, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("Failed to load server configuration")?;

    // RUST_LOG wins over the configured level; core `log` records are bridged
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize logging")?;

    tracing::info!(
        "Starting DOCX merge server (max body {} bytes)",
        config.max_body_bytes
    );
    let addr = config.bind_addr.clone();
    start_server(ApiState::new(config))
        .await
        .with_context(|| format!("Server on {addr} failed"))?;

    Ok(())
}
