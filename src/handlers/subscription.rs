//! Activation and subscription-gate HTTP handlers.
//!
//! These are the two endpoints the bot layer calls on behalf of end
//! users: redeeming a key and checking whether a user is currently
//! subscribed before running any privileged command.

use crate::{
    AppState,
    error::AppError,
    models::key::{ActivateKeyRequest, ActivateKeyResponse, SubscriptionInfo, TIMESTAMP_FORMAT},
};
use axum::{
    Json,
    extract::{Path, State},
};

/// Redeem a key for a user.
///
/// # Endpoint
///
/// `POST /api/v1/activate`
///
/// # Request Body
///
/// ```json
/// {
///   "key": "KEY1736937000",
///   "user_id": 42
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Confirmation with the expiry timestamp.
///   Re-activating with the same user succeeds again.
/// - **Error (404)**: Unknown key
/// - **Error (403)**: Key is banned (or was already deactivated after
///   expiring)
/// - **Error (410)**: Key just turned out to be expired; the record is
///   deactivated as part of this request
/// - **Error (409)**: Key belongs to a different user
pub async fn activate_key(
    State(state): State<AppState>,
    Json(request): Json<ActivateKeyRequest>,
) -> Result<Json<ActivateKeyResponse>, AppError> {
    let expire_at = state.service.activate(&request.key, request.user_id)?;

    Ok(Json(ActivateKeyResponse {
        message: format!(
            "Subscription activated! Expires at: {}",
            expire_at.format(TIMESTAMP_FORMAT)
        ),
        expire_at,
    }))
}

/// The authorization gate: is this user currently subscribed?
///
/// # Endpoint
///
/// `GET /api/v1/subscription/{user_id}`
///
/// The bot layer calls this before every privileged command and treats
/// any non-200 as "not subscribed".
///
/// # Response
///
/// - **Success (200 OK)**: key, plan, expiry and days left
/// - **Error (403 subscription_expired)**: the user's key just ran out;
///   its record is deactivated as part of this request
/// - **Error (403 no_active_subscription)**: nothing owned and active
///
/// # Policy
///
/// If a user owns several keys, the first owned active record in store
/// order answers for them; recency plays no part.
pub async fn check_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<SubscriptionInfo>, AppError> {
    Ok(Json(state.service.check_subscription(user_id)?))
}
