//! Application state shared across all handlers and extractors.

use std::sync::Arc;

use rankpulse_core::config::AppConfig;
use rankpulse_core::traits::health::HealthProbe;
use rankpulse_worker::fanout::FanOutScheduler;
use rankpulse_worker::queue::QueueRegistry;

/// Central application state, cheaply cloneable.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Process-wide queue registry.
    pub queues: Arc<QueueRegistry>,
    /// Fan-out shared with the in-process schedule.
    pub fanout: Arc<FanOutScheduler>,
    /// Repository round-trip used by the health probe.
    pub health: Arc<dyn HealthProbe>,
}
