use anyhow::Context;
use chapter_import::config::Config;
use chapter_import::routes::{self, AppState};
use chapter_import::services::importer::HttpBulkImporter;
use chapter_import::services::session::SessionStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    // Create the bulk import client
    let importer = Arc::new(HttpBulkImporter::new(&config));

    let app_state = AppState {
        sessions: SessionStore::new(),
        importer,
    };

    let app = routes::router(app_state, config.max_upload_bytes);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(
        import_api = %config.import_api_url,
        "Listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;

    Ok(())
}
