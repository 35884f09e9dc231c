//! Health check endpoint for service monitoring.

use crate::AppState;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
///
/// Returns service status and the size of the key store.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Number of key records currently in the store
    pub keys: usize,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Checks
///
/// - Store readability (loads the record set; a corrupt or missing file
///   reads as empty rather than failing, so this also smokes out
///   permission problems before the first real request)
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "keys": 12,
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let keys = state.service.list_all().len();

    Json(HealthResponse {
        status: "healthy".to_string(),
        keys,
        timestamp: Utc::now(),
    })
}
