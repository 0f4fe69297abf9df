//! Application configuration loading from config.toml and the environment.
//!
//! The TOML file carries the stable settings (backend URL, cadences, mirror
//! path); `ECOO_API_BASE_URL` and `ECOO_USER_ID` environment variables
//! override or supply the per-deployment values, the same way secrets stay
//! out of the checked-in file.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_full_refresh_every() -> u32 {
    5
}

fn default_mirror_path() -> String {
    "ecoo-mirror.json".to_string()
}

fn default_event_capacity() -> usize {
    16
}

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Base URL of the Ecoo backend (scheme + host, no trailing slash)
    pub api_base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Seconds between sync-status poll ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Every Nth tick additionally runs a full data refresh
    #[serde(default = "default_full_refresh_every")]
    pub full_refresh_every: u32,
    /// Path of the local mirror file
    #[serde(default = "default_mirror_path")]
    pub mirror_path: String,
    /// Broadcast channel capacity for credit-update events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl AppConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Poll cadence as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Loads configuration from a TOML file, then applies environment overrides.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or a
/// required field is missing.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let mut config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    if let Ok(base_url) = std::env::var("ECOO_API_BASE_URL") {
        info!("Overriding api_base_url from environment");
        config.api_base_url = base_url;
    }

    if config.full_refresh_every == 0 {
        return Err(Error::Config {
            message: "full_refresh_every must be at least 1".to_string(),
        });
    }

    if config.event_capacity == 0 {
        return Err(Error::Config {
            message: "event_capacity must be at least 1".to_string(),
        });
    }

    Ok(config)
}

/// Loads configuration from the default location (./config.toml), or the
/// path given in `ECOO_CONFIG`.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("ECOO_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}
