use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{info, warn};

use mailbot_api_server::config::Settings;
use mailbot_api_server::database::{DbPool, Repository, ThreadStore};
use mailbot_api_server::handlers;
use mailbot_api_server::services::{CompletionClient, ResponderEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,mailbot_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Starting mailbot API server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Initialize database pool and schema
    let db_pool = DbPool::new(&settings.database).await?;
    info!("Database connection established");

    let repository = Repository::new(db_pool);
    repository.ensure_email_tables().await?;

    // Initialize services
    if settings.llm.api_key.is_none() {
        warn!("Completion API key not set; automated replies will use the fallback text");
    }

    let completion_client = Arc::new(CompletionClient::new(settings.llm.clone()));
    let responder = Arc::new(ResponderEngine::new(completion_client));
    let store: Arc<dyn ThreadStore> = Arc::new(repository);

    // Build router
    let app = build_router(store, responder);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(store: Arc<dyn ThreadStore>, responder: Arc<ResponderEngine>) -> Router {
    handlers::router(store, responder)
        // Operator console
        .fallback_service(ServeDir::new("static"))
        // CORS: the original service accepted browser calls from anywhere
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
