use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dlsync_core::{
    load_config, validate_config, DownloadManager, HttpJobEngine, JobEngine, SqliteStorage,
    StorageBackend,
};
use dlsync_server::api::create_router;
use dlsync_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("DLSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Storage path: {:?}", config.storage.path);

    // Create SQLite storage for the job collection
    let backend: Arc<dyn StorageBackend> = Arc::new(
        SqliteStorage::new(&config.storage.path).context("Failed to open job storage")?,
    );
    info!("Job storage initialized");

    // Create job engine client if configured
    let engine: Option<Arc<dyn JobEngine>> = match &config.engine {
        Some(engine_config) => {
            info!("Using job engine at {}", engine_config.url);
            Some(Arc::new(
                HttpJobEngine::new(engine_config.clone())
                    .context("Failed to create job engine client")?,
            ))
        }
        None => {
            info!("No job engine configured, job actions are local only");
            None
        }
    };

    // Create and start the download manager
    let manager = Arc::new(DownloadManager::new(&config, backend, engine));
    manager.start().await;
    info!("Download manager started");

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&manager)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Flush pending updates and write the job table one last time
    info!("Server shutting down...");
    manager
        .shutdown()
        .await
        .context("Failed to save jobs on shutdown")?;
    info!("Download manager stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
