//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rankpulse_worker::queue::QueueStats;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when the database answered, `degraded` otherwise.
    pub status: String,
    /// Whether the database round-trip succeeded.
    pub db: bool,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /jobs/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatsResponse {
    /// Counts per queue.
    pub queues: Vec<QueueStats>,
}
