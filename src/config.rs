//! Deserializable configuration for collectors and the gateway, with
//! defaults matching the timings the upstream feed tolerates in practice.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_initial_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    10
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub url: String,

    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl CollectorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        CollectorConfig {
            url: url.into(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_attempts: default_max_attempts(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub circuits: Vec<CircuitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub circuit_id: String,
    #[serde(flatten)]
    pub collector: CollectorConfig,
}
