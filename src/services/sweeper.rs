//! Background cleanup scheduler.
//!
//! Runs the expiry sweep on a fixed interval, independent of request
//! traffic. A failed sweep is logged and the schedule simply continues
//! at the next tick; it is never fatal to the process.

use std::sync::Arc;
use std::time::Duration;

use crate::services::key_service::KeyService;

/// Drive periodic sweeps forever. Spawned once at startup.
pub async fn run(service: Arc<KeyService>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; consume it so the initial
    // sweep waits a full period after startup.
    ticker.tick().await;

    tracing::info!(period_secs = period.as_secs(), "Cleanup scheduler started");
    loop {
        ticker.tick().await;
        match service.sweep_expired() {
            Ok(0) => tracing::debug!("Sweep found nothing to deactivate"),
            Ok(count) => tracing::info!(count, "Sweep deactivated expired keys"),
            Err(e) => tracing::error!(error = %e, "Sweep failed"),
        }
    }
}
