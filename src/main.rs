//! # Intake Gateway - Main Entry Point
//!
//! Loads configuration, initializes logging and metrics, then serves the gateway
//! until SIGINT or SIGTERM, draining in-flight requests before exit.

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use intake_gateway::observability::{init_tracing, install_prometheus_recorder};
use intake_gateway::{GatewayConfig, GatewayServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH")
        .unwrap_or_else(|_| "config/gateway.yaml".to_string());

    let config = GatewayConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_tracing(&config.observability.logging);

    info!("Starting intake gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, services = config.services.len(), "Configuration loaded");

    let metrics = if config.observability.metrics.enabled {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };

    let server = GatewayServer::new(&config, metrics)?;
    info!("Gateway ready on {}", server.bind_addr());

    if let Err(e) = server.start(shutdown_signal()).await {
        error!("Gateway server error: {}", e);
        return Err(e.into());
    }

    info!("Gateway shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
