use anyhow::Result;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod models;
mod routes;
mod services;

use services::{file_store::FileStore, store::Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(
        "Upload dir {}, database {}, max file size {} bytes",
        config.upload_dir.display(),
        config.database_path,
        config.max_file_size
    );

    let store = Store::open(&config.database_path)?;
    let files = FileStore::new(&config.upload_dir);
    files.ensure_dir().await?;

    // Build our application state
    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, store, files));

    let app = routes::router(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// Application state
pub struct AppState {
    config: config::Config,
    store: Store,
    files: FileStore,
}

impl AppState {
    fn new(config: config::Config, store: Store, files: FileStore) -> Self {
        Self { config, store, files }
    }
}
