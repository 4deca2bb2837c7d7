//! File Upload Backend
//!
//! A REST API for uploading files to a local directory, listing them, and
//! downloading them again by their generated names.

use file_upload_backend::api::info::ENDPOINTS;
use file_upload_backend::config::Config;
use file_upload_backend::router::build_router;
use file_upload_backend::state::AppState;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = &dotenv {
        if !e.not_found() {
            warn!("Failed to load .env file: {}", e);
        }
    }

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let upload_dir = config.storage.upload_dir.clone();

    let app_state = AppState::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to prepare upload directory: {:?}", e))?;
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server is running on http://{}", addr);
    info!("Upload directory: {}", upload_dir);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("API endpoints:");
    info!("  {} - API info", ENDPOINTS.info);
    info!("  {} - Upload single file", ENDPOINTS.upload);
    info!("  {} - Upload multiple files", ENDPOINTS.upload_multiple);
    info!("  {} - List uploaded files", ENDPOINTS.files);
    info!("  {} - Download a file", ENDPOINTS.download);

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
