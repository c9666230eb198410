//! Publisher connection settings.

use std::time::Duration;

#[cfg(feature = "config")]
use core_config::{env_duration_millis, env_or_default, ConfigError, FromEnv};

/// Settings shared by broker-backed publishers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub url: String,
    pub client_name: String,
    /// JetStream stream that captures the published topics.
    pub stream_name: String,
    /// Upper bound on waiting for a broker acknowledgement.
    pub ack_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "orders".to_string(),
            stream_name: "ORDERS".to_string(),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

impl PublisherConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream_name: impl Into<String>) -> Self {
        self.stream_name = stream_name.into();
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

/// Environment variables:
/// - `NATS_URL` (default: `nats://localhost:4222`)
/// - `NATS_CLIENT_NAME` (default: `orders`)
/// - `NATS_STREAM_NAME` (default: `ORDERS`)
/// - `NATS_ACK_TIMEOUT_MS` (default: 5000)
#[cfg(feature = "config")]
impl FromEnv for PublisherConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            url: env_or_default("NATS_URL", &defaults.url),
            client_name: env_or_default("NATS_CLIENT_NAME", &defaults.client_name),
            stream_name: env_or_default("NATS_STREAM_NAME", &defaults.stream_name),
            ack_timeout: env_duration_millis("NATS_ACK_TIMEOUT_MS", defaults.ack_timeout)?,
        })
    }
}
