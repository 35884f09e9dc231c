//! Admin bearer-token authentication middleware.
//!
//! This middleware intercepts every admin request to:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and compare against the configured operator token hash
//! 3. Reject mismatches with HTTP 401
//!
//! The subscription gate itself is not middleware: it is the
//! `check_subscription` operation, exposed as its own endpoint and
//! composed explicitly by callers (the excluded bot layer calls it
//! before every privileged command).

use crate::{AppState, error::AppError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// SHA-256 of a token, hex encoded.
///
/// Both the configured token (once, at startup) and every presented
/// token go through this, so the plain token never sticks around in
/// state and comparisons are on fixed-size digests.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Compare against the operator token hash from configuration
/// 4. If equal: call next handler; otherwise return 401 Unauthorized
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Extract Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    // Step 2: Extract Bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    // Step 3: Compare digests
    if hash_token(token) != state.admin_token_hash {
        return Err(AppError::Unauthorized);
    }

    // Step 4: Call the next middleware/handler
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex_encoded() {
        let digest = hash_token("secret");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("secret"));
        assert_ne!(digest, hash_token("Secret"));
    }
}
