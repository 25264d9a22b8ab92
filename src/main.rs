// src/main.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod config;
mod forwarder;
mod health;
mod persistence;
mod registry;
mod retry;
mod server;

use crate::{
    config::BalancerConfig,
    forwarder::Forwarder,
    health::HealthProber,
    persistence::Persister,
    registry::Registry,
    retry::RetryPolicy,
    server::{handler::RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lor_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    info!("loading configuration from: {}", config_path);
    let config: BalancerConfig = config::load_config(&config_path).await?;

    let persister = Persister::new(config.persistence_path.clone());
    let initial = persister.load().await;
    info!(backends = ?initial, "loaded persisted backend roster");
    let registry = Arc::new(Registry::new(persister, initial));

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let prober = Arc::new(HealthProber::new(
        registry.clone(),
        client.clone(),
        config.probe_interval(),
        config.probe_timeout(),
    ));
    let prober_handle = tokio::spawn(prober.clone().run());

    let forwarder = Arc::new(Forwarder::new(
        registry.clone(),
        client,
        RetryPolicy::new(config.max_attempts, config.retry_delay()),
    ));

    let handler = RequestHandler::new(forwarder);

    info!(addr = %config.listen_addr, "starting load balancer");
    let server = ServerBuilder::new(config.listen_addr).with_handler(handler).serve();

    tokio::select! {
        result = server => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("stopping: no longer accepting new connections");
            prober.shutdown();
            prober_handle.abort();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
