//! Data models for the key store.
//!
//! This module contains the persisted key record, its derived views and
//! the HTTP request/response bodies built from them.

/// Subscription key records, plans and API types
pub mod key;
