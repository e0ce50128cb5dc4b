//! Per-queue default job options.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::backoff::{BackoffKind, BackoffPolicy};
use crate::types::job::{JobKind, JobOptions};

/// Default options for the jobs of one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueOptionsConfig {
    /// Attempts ceiling, including the first run.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// `"fixed"` or `"exponential"`.
    #[serde(default = "default_backoff_type")]
    pub backoff_type: BackoffKind,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Optional cap on a single backoff delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: Option<u64>,
}

impl QueueOptionsConfig {
    fn with(attempts: u32, backoff_base_ms: u64) -> Self {
        Self {
            attempts,
            backoff_type: default_backoff_type(),
            backoff_base_ms,
            backoff_max_ms: default_backoff_max(),
        }
    }

    /// Validate and convert into job options.
    pub fn to_options(&self) -> AppResult<JobOptions> {
        let options = JobOptions {
            attempts: self.attempts,
            backoff: BackoffPolicy {
                kind: self.backoff_type,
                base_delay_ms: self.backoff_base_ms,
                max_delay_ms: self.backoff_max_ms,
            },
        };
        options.validate()?;
        Ok(options)
    }
}

impl Default for QueueOptionsConfig {
    fn default() -> Self {
        Self::with(default_attempts(), default_backoff_base())
    }
}

/// Options for every queue, keyed by job kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Search-console sync queue.
    #[serde(default = "default_gsc_sync")]
    pub gsc_sync: QueueOptionsConfig,
    /// Performance fetch queue.
    #[serde(default = "default_performance")]
    pub performance: QueueOptionsConfig,
    /// Crawl queue.
    #[serde(default = "default_crawl")]
    pub crawl: QueueOptionsConfig,
    /// Score computation queue.
    #[serde(default = "default_score")]
    pub score: QueueOptionsConfig,
}

impl QueuesConfig {
    /// Raw settings for a kind.
    pub fn for_kind(&self, kind: JobKind) -> &QueueOptionsConfig {
        match kind {
            JobKind::GscSync => &self.gsc_sync,
            JobKind::Performance => &self.performance,
            JobKind::Crawl => &self.crawl,
            JobKind::Score => &self.score,
        }
    }

    /// Validated options for a kind.
    pub fn options_for(&self, kind: JobKind) -> AppResult<JobOptions> {
        self.for_kind(kind).to_options().map_err(|e| {
            AppError::configuration(format!("Queue '{}': {}", kind.queue_name(), e.message))
        })
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            gsc_sync: default_gsc_sync(),
            performance: default_performance(),
            crawl: default_crawl(),
            score: default_score(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_type() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_backoff_base() -> u64 {
    5_000
}

fn default_backoff_max() -> Option<u64> {
    Some(300_000)
}

fn default_gsc_sync() -> QueueOptionsConfig {
    QueueOptionsConfig::with(3, 5_000)
}

fn default_performance() -> QueueOptionsConfig {
    QueueOptionsConfig::with(3, 5_000)
}

fn default_crawl() -> QueueOptionsConfig {
    QueueOptionsConfig::with(3, 10_000)
}

fn default_score() -> QueueOptionsConfig {
    QueueOptionsConfig::with(5, 2_000)
}
