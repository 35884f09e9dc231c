//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into the key service
//! 3. Returns HTTP response (JSON, status code)

/// Service health endpoint
pub mod health;
/// Operator key administration endpoints
pub mod keys;
/// Activation and subscription gate endpoints
pub mod subscription;
