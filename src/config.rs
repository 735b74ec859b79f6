//! Configuration Module
//!
//! Environment-driven settings and data directory paths.

use std::path::PathBuf;

/// Default backend when `TOURFLEET_API_URL` is not set (local development).
const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "TOURFLEET_API_URL";

/// Runtime configuration for the client core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the TourFleet REST API, no trailing slash.
    pub api_base_url: String,
    /// Directory holding the encrypted token and log files.
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Build configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let api_base_url = std::env::var(API_URL_ENV)
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            data_dir: default_data_dir(),
        }
    }
}

/// Application data directory, `<local data>/TourFleet`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("TourFleet")
}

/// Log directory under the data directory.
pub fn log_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("logs")
}
