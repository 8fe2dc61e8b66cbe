//! Control service binary.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use thanos_control::api::{self, AppState};
use thanos_control::sdk::CliSdk;
use thanos_control::{PostgresStore, ServiceConfig, StackOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("thanos_control=info".parse()?),
        )
        .init();

    info!("Thanos control service starting");

    let config = ServiceConfig::load()?;
    info!(port = config.port, host = %config.postgres_host, "configuration loaded");

    let store = Arc::new(PostgresStore::new(&config.database_url()).await?);
    let sdk = Arc::new(CliSdk::new());
    let orchestrator = StackOrchestrator::new(store, sdk).await;

    let app = api::router(AppState {
        orchestrator: Arc::clone(&orchestrator),
    });

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %config.listen_addr(), "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, stopping task manager");
    orchestrator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
