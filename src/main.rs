//! Keygate - Main Application Entry Point
//!
//! This is a REST API server that grants and revokes time-bounded access
//! for users of an interactive bot. Subscription keys are issued under a
//! plan (daily/weekly/monthly/yearly), redeemed once by a user, and
//! swept into an inactive state after they expire.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: single JSON file, read and rewritten whole per operation
//! - **Authentication**: operator bearer token with SHA-256 hashing
//! - **Background**: periodic expiry sweep on a tokio task
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open (or create) the key store file
//! 3. Spawn the cleanup scheduler
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::services::key_service::KeyService;
use crate::store::JsonFileStore;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The key lifecycle manager
    pub service: Arc<KeyService>,

    /// SHA-256 hex digest of the operator token, precomputed at startup
    pub admin_token_hash: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Open the key store (creates an empty one on first run)
    let repo = JsonFileStore::new(&config.keys_file)?;
    let service = Arc::new(KeyService::new(Box::new(repo)));
    tracing::info!(path = %config.keys_file, "Key store opened");

    // Spawn the cleanup scheduler. A zero interval would make the
    // ticker panic, so floor it at one second.
    tokio::spawn(services::sweeper::run(
        service.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    ));

    let state = AppState {
        service,
        admin_token_hash: middleware::auth::hash_token(&config.admin_token),
    };

    // Create admin routes (operator surface)
    let admin_routes = Router::new()
        // Key issuance and inspection
        .route("/api/v1/keys", post(handlers::keys::issue_key))
        .route("/api/v1/keys", get(handlers::keys::list_keys))
        .route("/api/v1/keys/{id}", get(handlers::keys::get_key))
        .route(
            "/api/v1/users/{user_id}/keys",
            get(handlers::keys::list_user_keys),
        )
        // Key state transitions
        .route("/api/v1/keys/{id}/ban", post(handlers::keys::ban_key))
        .route("/api/v1/keys/{id}/unban", post(handlers::keys::unban_key))
        .route("/api/v1/keys/{id}/extend", post(handlers::keys::extend_key))
        // Manual expiry sweep
        .route("/api/v1/sweep", post(handlers::keys::sweep_keys))
        // Apply admin token middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    // Combine admin routes with the end-user surface
    let app = Router::new()
        // Public routes (no operator token required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/activate", post(handlers::subscription::activate_key))
        .route(
            "/api/v1/subscription/{user_id}",
            get(handlers::subscription::check_subscription),
        )
        // Merge admin routes
        .merge(admin_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share state with all handlers via State extraction
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
