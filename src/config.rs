//! Process configuration for shipyard
//!
//! Settings are read from environment variables with sensible defaults.
//! Per-project settings live in `shipyard.toml` instead (see [`crate::project`]).
//!
//! # Environment Variables
//!
//! - `SHIPYARD_API_URL`: Remote build service base URL - default: "https://api.shipyard.dev"
//! - `SHIPYARD_TOKEN`: Bearer token for the remote build service - optional
//! - `SHIPYARD_FALLBACK`: Try the rest of the builder chain on failure (true|false) - default: "true"
//! - `SHIPYARD_POLL_INTERVAL`: Seconds between deployment status polls - default: "5"
//! - `SHIPYARD_MAX_WAIT`: Seconds to wait for a deployment to finish - default: "600"
//! - `SHIPYARD_REQUEST_TIMEOUT`: HTTP request timeout in seconds - default: "30"
//! - `SHIPYARD_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use shipyard::ShipyardConfig;
//!
//! let config = ShipyardConfig::default();
//! config.validate().expect("Invalid configuration");
//! let service = config.create_remote_service().expect("HTTP client");
//! ```

use crate::remote::{HttpRemoteService, RemoteResult, StatusPoller};
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.shipyard.dev";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FALLBACK: bool = true;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_WAIT_SECS: u64 = 600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone)]
pub struct ShipyardConfig {
    pub api_url: String,

    /// Bearer token; never printed
    pub token: Option<String>,

    /// When false only the first builder of a chain is attempted
    pub fallback_enabled: bool,

    pub poll_interval_secs: u64,

    pub max_wait_secs: u64,

    pub request_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

impl Default for ShipyardConfig {
    /// Loads SHIPYARD_* environment variables, falling back to defaults for
    /// missing or unparsable values
    fn default() -> Self {
        let api_url = env::var("SHIPYARD_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let token = env::var("SHIPYARD_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let fallback_enabled = env::var("SHIPYARD_FALLBACK")
            .ok()
            .and_then(|v| match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(DEFAULT_FALLBACK);

        let log_level = env::var("SHIPYARD_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            api_url,
            token,
            fallback_enabled,
            poll_interval_secs: env_u64("SHIPYARD_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS),
            max_wait_secs: env_u64("SHIPYARD_MAX_WAIT", DEFAULT_MAX_WAIT_SECS),
            request_timeout_secs: env_u64(
                "SHIPYARD_REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            log_level,
        }
    }
}

impl ShipyardConfig {
    /// Checks ranges, interval ordering and the log level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::ParseError {
                field: "SHIPYARD_API_URL".to_string(),
                error: format!("'{}' is not an http(s) URL", self.api_url),
            });
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Poll interval must be at least 1 second".to_string(),
            ));
        }
        if self.max_wait_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max wait must be at least 1 second".to_string(),
            ));
        }
        if self.poll_interval_secs > self.max_wait_secs {
            return Err(ConfigError::ValidationFailed(format!(
                "Poll interval ({}s) cannot exceed max wait ({}s)",
                self.poll_interval_secs, self.max_wait_secs
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 1 hour".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn status_poller(&self) -> StatusPoller {
        StatusPoller::new(self.poll_interval(), self.max_wait())
    }

    /// HTTP client for the configured remote build service
    pub fn create_remote_service(&self) -> RemoteResult<HttpRemoteService> {
        HttpRemoteService::new(
            self.api_url.clone(),
            self.token.clone(),
            self.request_timeout(),
        )
    }

    /// Key/value view for JSON/YAML output; the token is masked
    pub fn to_display_map(&self) -> std::collections::BTreeMap<String, String> {
        let mut map = std::collections::BTreeMap::new();

        map.insert("api_url".to_string(), self.api_url.clone());
        map.insert(
            "token".to_string(),
            if self.token.is_some() { "***" } else { "(unset)" }.to_string(),
        );
        map.insert(
            "fallback_enabled".to_string(),
            self.fallback_enabled.to_string(),
        );
        map.insert(
            "poll_interval_secs".to_string(),
            self.poll_interval_secs.to_string(),
        );
        map.insert("max_wait_secs".to_string(), self.max_wait_secs.to_string());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for ShipyardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shipyard Configuration:")?;
        writeln!(f, "  API URL: {}", self.api_url)?;
        writeln!(
            f,
            "  Token: {}",
            if self.token.is_some() { "***" } else { "(unset)" }
        )?;
        writeln!(f, "  Fallback: {}", self.fallback_enabled)?;
        writeln!(f, "  Poll Interval: {}s", self.poll_interval_secs)?;
        writeln!(f, "  Max Wait: {}s", self.max_wait_secs)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
