use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use wardlink::api::create_app;
use wardlink::clock::system_clock;
use wardlink::config::resolve_config;
use wardlink::relay::RelayHub;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wardlink=info".into()),
        )
        .init();

    info!("Wardlink relay starting...");

    let config_path = std::env::args().nth(1).or_else(|| std::env::var("WARDLINK_CONFIG").ok());
    let config = resolve_config(config_path.as_deref())?;

    let clock = system_clock();
    let hub = RelayHub::spawn(&config.relay, clock.clone());
    let app = create_app(hub, clock);

    let listener = TcpListener::bind(&config.relay.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.relay.bind_addr))?;
    info!(addr = %config.relay.bind_addr, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server failed")?;

    info!("Wardlink relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
