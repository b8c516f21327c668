//! Worker configuration.
//!
//! Configuration is loaded from environment variables; every field has a
//! development-friendly default.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default Coordinator worker endpoint.
pub const DEFAULT_COORDINATOR_URL: &str = "ws://127.0.0.1:8000/wso";

/// Default directory for save-state files.
pub const DEFAULT_SAVE_DIR: &str = "saves";

/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Default deadline for synchronous Coordinator round trips, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Worker configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket URL of the Coordinator's worker endpoint.
    pub coordinator_url: String,

    /// Directory the save store keeps state files in.
    pub save_dir: String,

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Request deadline for Coordinator round trips, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let coordinator_url = vars
            .get("WORKER_COORDINATOR_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_COORDINATOR_URL.to_string());

        let save_dir = vars
            .get("WORKER_SAVE_DIR")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SAVE_DIR.to_string());

        let heartbeat_interval_ms = vars
            .get("WORKER_HEARTBEAT_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);

        let request_timeout_ms = vars
            .get("WORKER_REQUEST_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        Self {
            coordinator_url,
            save_dir,
            heartbeat_interval_ms,
            request_timeout_ms,
        }
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new());

        assert_eq!(config.coordinator_url, DEFAULT_COORDINATOR_URL);
        assert_eq!(config.save_dir, DEFAULT_SAVE_DIR);
        assert_eq!(config.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            (
                "WORKER_COORDINATOR_URL".to_string(),
                "ws://coordinator:9000/wso".to_string(),
            ),
            ("WORKER_SAVE_DIR".to_string(), "/var/arcadia".to_string()),
            ("WORKER_HEARTBEAT_INTERVAL_MS".to_string(), "250".to_string()),
            ("WORKER_REQUEST_TIMEOUT_MS".to_string(), "5000".to_string()),
        ]);

        let config = Config::from_vars(&vars);

        assert_eq!(config.coordinator_url, "ws://coordinator:9000/wso");
        assert_eq!(config.save_dir, "/var/arcadia");
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let vars = HashMap::from([(
            "WORKER_HEARTBEAT_INTERVAL_MS".to_string(),
            "soon".to_string(),
        )]);

        let config = Config::from_vars(&vars);
        assert_eq!(config.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
    }
}
