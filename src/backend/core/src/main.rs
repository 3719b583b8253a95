//! Reqlens Server - Main entry point
//!
//! Listens for telemetry producers over TCP and serves display clients over
//! HTTP/WebSocket.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use reqlens_core::{
    api::{self, AppState},
    config::Config,
    events::{AggregationStore, StoreService},
    ingest::IngestListener,
    telemetry,
};

const NOTIFICATION_FANOUT_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("REQLENS_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    let metrics = telemetry::init_telemetry(&config.telemetry())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Reqlens Server"
    );

    // Store task
    let store = AggregationStore::new(config.store.notification_capacity);
    let (store_handle, store_task) = StoreService::spawn(store, config.store.command_capacity);

    // Display notifications: store changes plus producer lifecycle
    let (notifications, _) = broadcast::channel(NOTIFICATION_FANOUT_CAPACITY);
    let forwarder = api::spawn_change_forwarder(&store_handle, notifications.clone());

    // Ingestion
    let shutdown = CancellationToken::new();
    let ingest = IngestListener::bind(&config.ingest, store_handle.clone(), notifications.clone()).await?;
    tracing::info!(address = %ingest.local_addr()?, "Ingestion listener bound");
    let ingest_task = tokio::spawn(ingest.run(shutdown.clone()));

    // HTTP / WebSocket
    let app_state = AppState::new(store_handle, notifications, metrics);
    let app = api::build_router(app_state);

    let addr = config.server.addr();
    tracing::info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let http_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            http_shutdown.cancel();
        })
        .await?;

    // Cleanup
    shutdown.cancel();
    if let Ok(Err(e)) = ingest_task.await {
        e.log();
    }
    forwarder.abort();
    store_task.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
