/// Configuration management for the flowedit service
///
/// Handles the local server address, the flows backend connection and the
/// realtime channel size.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Flows backend configuration
    pub backend: BackendConfig,
    /// Realtime notification configuration
    pub realtime: RealtimeConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "127.0.0.1")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Flows backend used to persist operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base API URL; operations go to `{api_url}/v1/flows/{flow_id}`
    pub api_url: String,
    /// Bearer token sent with every persistence call
    pub api_token: Option<String>,
    /// Per-request timeout; unset means a started call is never abandoned
    pub request_timeout_secs: Option<u64>,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Realtime channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Events buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("FLOWEDIT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("FLOWEDIT_PORT")
                    .unwrap_or_else(|_| "3005".to_string())
                    .parse()
                    .unwrap_or(3005),
            },
            backend: BackendConfig {
                api_url: std::env::var("FLOWEDIT_API_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
                api_token: std::env::var("FLOWEDIT_API_TOKEN")
                    .ok()
                    .filter(|token| !token.is_empty()),
                request_timeout_secs: std::env::var("FLOWEDIT_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|secs| secs.parse().ok()),
            },
            realtime: RealtimeConfig {
                channel_capacity: std::env::var("FLOWEDIT_REALTIME_CAPACITY")
                    .ok()
                    .and_then(|capacity| capacity.parse().ok())
                    .unwrap_or(256),
            },
        }
    }
}
