//! API Configuration Module
//!
//! This module provides configuration for the HTTP listener and CORS.
//! Configuration is loaded from environment variables with sensible
//! defaults for development.

use std::net::SocketAddr;
use std::time::Duration;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the listener and CORS.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            cors_origins: Vec::new(), // Empty = allow all
            cors_max_age_secs: 86400, // 24 hours
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CLINICA_BIND_ADDR`: Listener address (default: 0.0.0.0:8080)
    /// - `CLINICA_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `CLINICA_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `CLINICA_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("CLINICA_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bind_addr);

        let cors_origins = std::env::var("CLINICA_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("CLINICA_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let request_timeout = Duration::from_secs(
            std::env::var("CLINICA_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );

        Self {
            bind_addr,
            cors_origins,
            cors_max_age_secs,
            request_timeout,
        }
    }

    /// Whether any origin is allowed (dev mode).
    pub fn cors_allow_any(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.cors_allow_any());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
