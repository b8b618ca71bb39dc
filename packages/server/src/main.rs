//! Label server: signed submissions in, print jobs out to connected agents.

use api::{ServerConfig, init_label_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let server = init_label_server(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    // Agent sockets are closed first so the server can drain.
    let registry = server.state.coordinator.registry().clone();
    axum::serve(listener, server.router())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            registry.disconnect_all().await;
        })
        .await?;

    server.shutdown().await;
    tracing::info!("done");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
