use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use academic_records_api::config::Config;
use academic_records_api::db::Database;
use academic_records_api::db_storage::PostgresStore;
use academic_records_api::handlers::AppState;
use academic_records_api::storage::{MemoryStore, RecordStore};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, selects the record store
/// (Postgres when `DATABASE_URL` is set, in-memory otherwise) and serves the
/// HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "academic_records_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let store: Arc<dyn RecordStore> = match config.database_url {
        Some(ref url) => {
            let db = Database::new(url, config.db_max_connections).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PostgresStore::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("Records are kept in memory and will be lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let app = academic_records_api::app(Arc::new(AppState::new(store)));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
