//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `ADMIN_TOKEN` (required): bearer token for the admin endpoints
/// - `KEYS_FILE` (optional): path to the JSON key store, defaults to `keys.json`
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `SWEEP_INTERVAL_SECS` (optional): seconds between expiry sweeps, defaults to 3600
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub admin_token: String,

    #[serde(default = "default_keys_file")]
    pub keys_file: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Default store file, next to the working directory like the rest of
/// the service's state.
fn default_keys_file() -> String {
    "keys.json".to_string()
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Hourly sweeps unless configured otherwise.
fn default_sweep_interval() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., ADMIN_TOKEN)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: admin_token -> ADMIN_TOKEN
        envy::from_env::<Config>()
    }
}
