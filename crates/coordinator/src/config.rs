//! Coordinator configuration.
//!
//! Configuration is loaded from environment variables; every field has a
//! development-friendly default.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default deadline for relay round trips, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Coordinator configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_address: String,

    /// Deadline for synchronous relay round trips, in milliseconds. A worker
    /// that fails to answer inside this window produces an in-band error
    /// reply instead of hanging the browser.
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
        let bind_address = vars
            .get("COORDINATOR_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let request_timeout_ms = vars
            .get("COORDINATOR_REQUEST_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        Self {
            bind_address,
            request_timeout_ms,
        }
    }

    /// Relay deadline as a [`Duration`].
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
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            (
                "COORDINATOR_BIND_ADDRESS".to_string(),
                "127.0.0.1:9000".to_string(),
            ),
            (
                "COORDINATOR_REQUEST_TIMEOUT_MS".to_string(),
                "2500".to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars);
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.request_timeout(), Duration::from_millis(2500));
    }
}
