/// Server setup and initialization
///
/// Wires together all components: persistence client, realtime channel,
/// session registry and HTTP routes. Provides the application factory used
/// by the binary and by the HTTP tests.

use crate::{
    api::{create_realtime_routes, create_session_routes, AppState},
    backend::{persistence::HttpFlowPersistence, realtime::RealtimeChannel},
    config::Config,
    editor::{registry::SessionRegistry, session::EditorServices},
    flow::mutation::FlowOperationApplier,
    steps::queries::StepQueryCache,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Builds the backend client and the shared services from `config`.
pub fn create_app(config: &Config) -> Result<Router> {
    tracing::info!("🌍 Using flows backend at {}", config.backend.api_url);
    let persistence = HttpFlowPersistence::new(
        config.backend.api_url.clone(),
        config.backend.api_token.clone(),
        config.backend.request_timeout(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize persistence client: {}", e))?;

    tracing::info!(
        "📡 Initializing realtime channel (capacity {})",
        config.realtime.channel_capacity
    );
    let queries = StepQueryCache::new();
    let services = EditorServices {
        persistence: Arc::new(persistence),
        mutator: Arc::new(FlowOperationApplier::new()),
        realtime: RealtimeChannel::new(config.realtime.channel_capacity),
        queries: Arc::new(queries.clone()),
    };

    tracing::info!("📊 Initializing session registry");
    let state = AppState::new(SessionRegistry::new(), services, queries);

    let app = create_router(state);
    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Build the router around an existing application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Editor session API routes
        .merge(create_session_routes())
        // Realtime push route
        .merge(create_realtime_routes())
        .with_state(state)
}

/// Start the HTTP server with the given configuration
///
/// Creates the application and starts the Axum server on the configured address and port.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting flowedit server...");

    let app = create_app(&config)?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
