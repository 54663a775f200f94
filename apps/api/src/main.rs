mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod refinement;
mod routes;
mod solutions;
mod state;
mod training;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, init_schema};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::training::intake::LocalIntake;
use crate::training::registry::SessionRegistry;
use crate::training::store::SqliteTrainingStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MagicBox API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite
    let db = create_pool(&config.database_url).await?;
    init_schema(&db).await?;
    info!("Database ready at {}", config.database_url);

    // Initialize LLM client
    let llm = LlmClient::new(
        config.llama_api_key.clone(),
        config.llama_api_url.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    info!(
        "Training readiness: {} documents, {} approved, {}% average confidence",
        config.readiness.min_documents,
        config.readiness.min_approved,
        config.readiness.min_confidence
    );

    // Build app state
    let state = AppState {
        db: db.clone(),
        llm: Arc::new(llm),
        intake: Arc::new(LocalIntake),
        store: Arc::new(SqliteTrainingStore::new(db)),
        sessions: SessionRegistry::default(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
