use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result status of a successful round-trip.
pub const OK: u32 = 0;
/// Result status of a failed round-trip.
pub const ERROR: u32 = 1;
/// Default request timeout, in milliseconds.
pub const TIMEOUT: u64 = 32_000;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tunables of the boundary client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// How long a caller waits for a reply unless a request overrides it.
    pub timeout_ms: u64,
    /// Depth of the outbound and inbound message channels.
    pub channel_capacity: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BoundaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
