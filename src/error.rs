//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! Every expected failure in the key lifecycle is a variant here and is
//! reported back to the caller as structured JSON; none of them abort
//! the process.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Issuance errors**: `InvalidPlan`, `DuplicateKey`
/// - **Lookup errors**: `KeyNotFound`
/// - **Activation conflicts**: `KeyBanned`, `KeyExpired`, `KeyOwnedByOther`
/// - **Administration conflicts**: `CannotUnbanExpired`
/// - **Gate refusals**: `SubscriptionExpired`, `NoActiveSubscription`
/// - **Authentication**: `Unauthorized` (admin surface)
/// - **Storage**: `Storage` (the only 500; detail is hidden from clients)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested plan is not in the closed plan set.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Unknown plan '{0}'. Available plans: daily, weekly, monthly, yearly")]
    InvalidPlan(String),

    /// A key with the requested custom identifier already exists.
    ///
    /// The existing record is left untouched. Returns HTTP 409 Conflict.
    #[error("Key already exists")]
    DuplicateKey,

    /// Operation referenced an unknown key identifier.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Key not found")]
    KeyNotFound,

    /// Activation refused because the key is banned or frozen.
    ///
    /// Also what an expired-then-deactivated key reports on subsequent
    /// attempts: the first attempt past expiry returns `KeyExpired` and
    /// flips the record inactive, every attempt after that lands here.
    /// Returns HTTP 403 Forbidden.
    #[error("Key is banned or frozen")]
    KeyBanned,

    /// Activation found the key past its expiry moment.
    ///
    /// Raising this deactivates the record as a side effect.
    /// Returns HTTP 410 Gone.
    #[error("Key has expired")]
    KeyExpired,

    /// Key is already bound to a different user.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Key is already in use by another user")]
    KeyOwnedByOther,

    /// Unban refused because the key is past its expiry moment.
    ///
    /// Expired keys can only come back through extension.
    /// Returns HTTP 409 Conflict.
    #[error("Cannot unban an expired key")]
    CannotUnbanExpired,

    /// The user's subscription was found but has run out.
    ///
    /// Raising this deactivates the backing record as a side effect.
    /// Returns HTTP 403 Forbidden.
    #[error("Your subscription has expired")]
    SubscriptionExpired,

    /// The user owns no active subscription at all.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("No active subscription")]
    NoActiveSubscription,

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Admin token is missing or wrong.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid admin token")]
    Unauthorized,

    /// Writing the store file failed.
    ///
    /// Reads never raise this: a missing or corrupt file reads as an
    /// empty store. Returns HTTP 500 Internal Server Error with the
    /// detail hidden from the client.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "invalid_plan", self.to_string()),
            AppError::DuplicateKey => (StatusCode::CONFLICT, "duplicate_key", self.to_string()),
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "key_not_found", self.to_string()),
            AppError::KeyBanned => (StatusCode::FORBIDDEN, "key_banned", self.to_string()),
            AppError::KeyExpired => (StatusCode::GONE, "key_expired", self.to_string()),
            AppError::KeyOwnedByOther => {
                (StatusCode::CONFLICT, "key_owned_by_other", self.to_string())
            }
            AppError::CannotUnbanExpired => {
                (StatusCode::CONFLICT, "cannot_unban_expired", self.to_string())
            }
            AppError::SubscriptionExpired => {
                (StatusCode::FORBIDDEN, "subscription_expired", self.to_string())
            }
            AppError::NoActiveSubscription => (
                StatusCode::FORBIDDEN,
                "no_active_subscription",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
