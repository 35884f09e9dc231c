//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers:
//! the key lifecycle manager and the background cleanup scheduler.

pub mod key_service;
pub mod sweeper;
