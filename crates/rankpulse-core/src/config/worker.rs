//! Background worker configuration.

use serde::{Deserialize, Serialize};

use crate::types::job::JobKind;

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether this process runs workers.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Jobs processed concurrently per queue.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound on a single handler run, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Claims older than this are considered abandoned on worker start.
    #[serde(default = "default_stalled_after")]
    pub stalled_after_seconds: u64,
    /// Queues this process consumes.
    #[serde(default = "default_queues")]
    pub queues: Vec<JobKind>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            job_timeout_seconds: default_job_timeout(),
            stalled_after_seconds: default_stalled_after(),
            queues: default_queues(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_job_timeout() -> u64 {
    300
}

fn default_stalled_after() -> u64 {
    900
}

fn default_queues() -> Vec<JobKind> {
    JobKind::ALL.to_vec()
}
