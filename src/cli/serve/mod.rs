//! Serve command - HTTP API plus the cron scheduler

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api;
use crate::config::AppConfig;
use crate::infrastructure::observability::init_metrics;

pub async fn run() -> anyhow::Result<()> {
    let config = super::bootstrap();
    let metrics = init_metrics(&config.metrics);

    let state = crate::create_app_state(&config)?;
    let scheduler = crate::create_scheduler(&state, &config).map(|s| s.spawn());

    let app = api::with_metrics(api::create_router(state), metrics, &config.metrics.path);

    let addr = build_socket_addr(&config)?;
    info!("Starting prompt chain engine on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
