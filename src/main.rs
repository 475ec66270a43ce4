//! TuneHub Server
//!
//! A self-hosted music library server: song uploads to S3-compatible
//! storage with metadata in SQLite.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunehub_server::config::Config;
use tunehub_server::state::AppState;
use tunehub_server::{db, routes, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tunehub_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting TuneHub Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Audio bucket: {}", config.upload.audio_bucket);
    tracing::info!("Image bucket: {}", config.upload.image_bucket);

    // Initialize blob storage
    let buckets = [config.upload.audio_bucket.as_str(), config.upload.image_bucket.as_str()];
    let blob_store = storage::connect(&config.storage, &buckets)
        .await
        .context("Failed to initialize blob storage")?;
    tracing::info!("Blob storage: {}", blob_store.describe());

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    // Create application state
    let app_state = AppState::new(config.clone(), blob_store, db_pool)
        .context("Failed to initialize application state")?;

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;
    tracing::info!("TuneHub Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
