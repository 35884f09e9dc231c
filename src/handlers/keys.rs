//! Key administration HTTP handlers.
//!
//! This module implements the operator-only endpoints:
//! - POST /api/v1/keys - Issue a new key
//! - GET /api/v1/keys - List every key with its derived view
//! - GET /api/v1/keys/{id} - Inspect one key
//! - GET /api/v1/users/{user_id}/keys - Keys owned by one user
//! - POST /api/v1/keys/{id}/ban, .../unban, .../extend
//! - POST /api/v1/sweep - Run the expiry sweep on demand
//!
//! All of these sit behind the admin token middleware.

use crate::{
    AppState,
    error::AppError,
    models::key::{
        ExtendKeyRequest, IssueKeyRequest, IssueKeyResponse, KeyDetails, MessageResponse, Plan,
        SweepResponse, TIMESTAMP_FORMAT,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::collections::BTreeMap;

/// Issue a new subscription key.
///
/// # Endpoint
///
/// `POST /api/v1/keys`
///
/// # Request Body
///
/// ```json
/// {
///   "plan": "monthly",
///   "custom_key": "VIP-1"  // optional, generated when omitted
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: `{"key": "KEY1736937000"}`
/// - **Error (400)**: Unknown plan
/// - **Error (409)**: Custom key already exists (existing record untouched)
pub async fn issue_key(
    State(state): State<AppState>,
    Json(request): Json<IssueKeyRequest>,
) -> Result<(StatusCode, Json<IssueKeyResponse>), AppError> {
    // Validate against the closed plan set before touching the store
    let plan: Plan = request.plan.parse()?;
    let key = state.service.issue(plan, request.custom_key)?;

    Ok((StatusCode::CREATED, Json(IssueKeyResponse { key })))
}

/// List every key with its derived `expired`/`days_left`/`status` view.
///
/// # Endpoint
///
/// `GET /api/v1/keys`
///
/// The derived fields are computed at request time and never persisted,
/// so a key that expired a second ago already shows `"status": "expired"`
/// here even though no sweep has flipped its record yet.
pub async fn list_keys(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, KeyDetails>>, AppError> {
    Ok(Json(state.service.list_all()))
}

/// Inspect a single key.
///
/// # Endpoint
///
/// `GET /api/v1/keys/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: Full record plus derived fields
/// - **Error (404)**: Unknown key
pub async fn get_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<KeyDetails>, AppError> {
    Ok(Json(state.service.key_info(&key_id)?))
}

/// List all keys owned by one user.
///
/// # Endpoint
///
/// `GET /api/v1/users/{user_id}/keys`
///
/// Returns an empty mapping for users who own nothing; owning a key is
/// not the same as being subscribed (the key may be banned or expired).
pub async fn list_user_keys(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<BTreeMap<String, KeyDetails>>, AppError> {
    Ok(Json(state.service.list_for_user(user_id)))
}

/// Ban a key unconditionally.
///
/// # Endpoint
///
/// `POST /api/v1/keys/{id}/ban`
///
/// Banning is a soft operation: the record stays in the store with
/// `active = false` and can be unbanned while still unexpired.
pub async fn ban_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.service.ban(&key_id)?;

    Ok(Json(MessageResponse {
        message: format!("Key {key_id} banned"),
    }))
}

/// Lift a ban from an unexpired key.
///
/// # Endpoint
///
/// `POST /api/v1/keys/{id}/unban`
///
/// # Response
///
/// - **Success (200 OK)**: Key is active again
/// - **Error (404)**: Unknown key
/// - **Error (409)**: Key is past its expiry; unban cannot resurrect it
///   (use extend instead)
pub async fn unban_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.service.unban(&key_id)?;

    Ok(Json(MessageResponse {
        message: format!("Key {key_id} unbanned"),
    }))
}

/// Extend (or shorten) a key's validity.
///
/// # Endpoint
///
/// `POST /api/v1/keys/{id}/extend`
///
/// # Request Body
///
/// ```json
/// { "days": 30 }
/// ```
///
/// `days` shifts the *current* expiry, not today, and may be negative.
/// The key is forced active regardless of its previous state; this is
/// the only way to bring an expired key back.
pub async fn extend_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
    Json(request): Json<ExtendKeyRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let expire_at = state.service.extend(&key_id, request.days)?;

    Ok(Json(MessageResponse {
        message: format!(
            "Key {key_id} extended by {} days. New expiry: {}",
            request.days,
            expire_at.format(TIMESTAMP_FORMAT)
        ),
    }))
}

/// Run the expiry sweep right now.
///
/// # Endpoint
///
/// `POST /api/v1/sweep`
///
/// Same operation the background scheduler runs on its interval;
/// exposed so an operator can reconcile the store on demand.
///
/// # Response
///
/// ```json
/// { "deactivated": 3 }
/// ```
pub async fn sweep_keys(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let deactivated = state.service.sweep_expired()?;

    Ok(Json(SweepResponse { deactivated }))
}
