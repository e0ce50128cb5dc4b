//! Backend selection from configuration.

use std::sync::Arc;


use rankpulse_core::config::BrokerConfig;
use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;

/// Build the broker named by configuration.
///
/// Returns `Ok(None)` when no address is configured. `memory://` selects
/// the in-process backend; `redis://` and `rediss://` select Redis. The
/// Redis connection itself is established lazily, so an unreachable
/// server does not fail here.
pub fn connect(config: &BrokerConfig) -> AppResult<Option<Arc<dyn JobBroker>>> {
    let Some(address) = config.address() else {
        tracing::info!("No broker address configured");
        return Ok(None);
    };

    let broker: Arc<dyn JobBroker> = match address.split("://").next().unwrap_or_default() {
        #[cfg(feature = "redis-backend")]
        "redis" | "rediss" => {
            let client = crate::redis::RedisClient::open(address, &config.key_prefix)?;
            Arc::new(crate::redis::RedisBroker::new(client))
        }
        #[cfg(feature = "memory")]
        "memory" => {
            tracing::info!("Using in-process job broker");
            Arc::new(crate::memory::MemoryBroker::new())
        }
        other => {
            return Err(AppError::configuration(format!(
                "Unsupported broker scheme: '{other}'. Supported: redis, rediss, memory"
            )));
        }
    };

    Ok(Some(broker))
}
