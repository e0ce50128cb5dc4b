//! Broker connection configuration.

use serde::{Deserialize, Serialize};

/// Broker (Redis) configuration.
///
/// When `url` is absent or blank the process runs without queues: enqueue
/// fails fast and workers stay unattached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Redis connection URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Key prefix for every broker key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How long a worker blocks waiting for a job before re-checking
    /// delayed jobs and shutdown, in milliseconds.
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_ms: u64,
}

impl BrokerConfig {
    /// The configured address, ignoring blank values.
    pub fn address(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
            claim_timeout_ms: default_claim_timeout(),
        }
    }
}

fn default_key_prefix() -> String {
    "rankpulse:".to_string()
}

fn default_claim_timeout() -> u64 {
    1000
}
