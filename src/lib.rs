pub mod admission;
pub mod config;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod image;
pub mod models;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::handlers::AppState;
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the service router
pub fn app(state: AppState) -> Router {
    // Two images up to the configured ceiling plus multipart overhead.
    let body_limit = state.config.image.max_size_bytes * 2 + 64 * 1024;
    let timeout = Duration::from_secs(state.config.server.timeout_secs);

    Router::new()
        .route("/", get(handlers::root))
        .route("/analyze", post(handlers::analyze))
        .route("/analyze-urls", post(handlers::analyze_urls))
        .route("/rate-limit", get(handlers::rate_limit_status))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Initialize and run the service
pub async fn init_service(config: ServiceConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting Design Version AI service");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let api_key = config::api_key_from_env()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(config, api_key)?;
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(crate::error::ServiceError::Io)?;

    info!("Service ready to accept connections");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::ServiceError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "designlens=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
