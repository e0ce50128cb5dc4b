//! Named queues over the shared broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use rankpulse_core::config::{BrokerConfig, QueuesConfig};
use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::types::job::{
    JobHandle, JobKind, JobOptions, JobOptionsOverride, JobPayload, JobRecord, QueueCounts,
    ready_after,
};

/// A live queue for one job kind.
#[derive(Debug, Clone)]
pub struct Queue {
    /// Kind of job held by this queue.
    kind: JobKind,
    /// Shared broker connection.
    broker: Arc<dyn JobBroker>,
    /// Options applied to jobs enqueued without overrides.
    defaults: JobOptions,
}

impl Queue {
    /// Job kind held by this queue.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Broker queue name.
    pub fn name(&self) -> &'static str {
        self.kind.queue_name()
    }

    /// Options applied to jobs enqueued without overrides.
    pub fn default_options(&self) -> JobOptions {
        self.defaults
    }

    /// The broker this queue stores jobs in.
    pub fn broker(&self) -> &Arc<dyn JobBroker> {
        &self.broker
    }

    /// Record a job with the broker and return its handle.
    ///
    /// Returns once the broker has stored the job. Connection failures
    /// surface as `BrokerUnavailable`.
    pub async fn enqueue(
        &self,
        payload: JobPayload,
        overrides: &JobOptionsOverride,
    ) -> AppResult<JobHandle> {
        let options = self.defaults.apply(overrides)?;
        let job = JobRecord::new(self.kind, payload, options);
        let ready_at = overrides
            .delay_ms
            .filter(|ms| *ms > 0)
            .map(|ms| ready_after(Utc::now(), ms));

        self.broker.push(self.name(), &job, ready_at).await?;

        tracing::debug!(
            queue = self.name(),
            job_id = %job.id,
            site_id = %job.payload.site_id,
            delayed = ready_at.is_some(),
            "Enqueued job"
        );
        Ok(job.handle())
    }

    /// Current counts for this queue.
    pub async fn stats(&self) -> AppResult<QueueStats> {
        let counts = self.broker.counts(self.name()).await?;
        Ok(QueueStats {
            queue: self.name().to_string(),
            counts,
        })
    }
}

/// Counts for one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,
    /// Set sizes.
    #[serde(flatten)]
    pub counts: QueueCounts,
}

/// Process-wide registry of queues, built once at start-up.
///
/// When no broker is configured the registry is still constructed, but
/// every queue is absent and enqueue fails with `BrokerUnavailable`.
#[derive(Debug)]
pub struct QueueRegistry {
    broker: Option<Arc<dyn JobBroker>>,
    defaults: HashMap<JobKind, JobOptions>,
    claim_timeout: Duration,
}

impl QueueRegistry {
    /// Validate queue options and connect the configured broker.
    ///
    /// Invalid queue options are a configuration error. A missing broker
    /// address is not.
    pub fn init(broker: &BrokerConfig, queues: &QueuesConfig) -> AppResult<Self> {
        let connection = rankpulse_broker::connect(broker)?;
        if connection.is_none() {
            tracing::warn!("No broker address configured, queues and workers are unavailable");
        }
        Self::build(
            connection,
            queues,
            Duration::from_millis(broker.claim_timeout_ms),
        )
    }

    /// Build a registry over an already-connected broker, or none.
    pub fn build(
        broker: Option<Arc<dyn JobBroker>>,
        queues: &QueuesConfig,
        claim_timeout: Duration,
    ) -> AppResult<Self> {
        let mut defaults = HashMap::new();
        for kind in JobKind::ALL {
            let options = queues.options_for(kind)?;
            if broker.is_some() {
                tracing::info!(
                    queue = kind.queue_name(),
                    attempts = options.attempts,
                    backoff = options.backoff.kind.as_str(),
                    backoff_base_ms = options.backoff.base_delay_ms,
                    "Queue initialized"
                );
            }
            defaults.insert(kind, options);
        }

        Ok(Self {
            broker,
            defaults,
            claim_timeout,
        })
    }

    /// Whether a broker is attached.
    pub fn is_available(&self) -> bool {
        self.broker.is_some()
    }

    /// The shared broker, if configured.
    pub fn broker(&self) -> Option<&Arc<dyn JobBroker>> {
        self.broker.as_ref()
    }

    /// How long a single claim blocks.
    pub fn claim_timeout(&self) -> Duration {
        self.claim_timeout
    }

    /// The queue for `kind`, or `None` when no broker is configured.
    pub fn queue(&self, kind: JobKind) -> Option<Queue> {
        self.broker.as_ref().map(|broker| Queue {
            kind,
            broker: Arc::clone(broker),
            defaults: self.default_options(kind),
        })
    }

    /// Default options for `kind`, available with or without a broker.
    pub fn default_options(&self, kind: JobKind) -> JobOptions {
        // `build` inserts every kind.
        self.defaults[&kind]
    }

    /// Enqueue on the queue for `kind`.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        payload: JobPayload,
        overrides: &JobOptionsOverride,
    ) -> AppResult<JobHandle> {
        self.queue(kind)
            .ok_or_else(|| unavailable(kind))?
            .enqueue(payload, overrides)
            .await
    }

    /// Ping the broker once and log whether it answered.
    ///
    /// `false` when no broker is configured or it did not answer.
    pub async fn check_broker(&self) -> bool {
        let Some(broker) = self.broker.as_ref() else {
            return false;
        };
        match broker.ping().await {
            Ok(true) => {
                tracing::info!("Broker reachable");
                true
            }
            Ok(false) => {
                tracing::warn!("Broker answered ping with an unexpected reply");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Broker unreachable, enqueue will fail until it recovers");
                false
            }
        }
    }

    /// Counts for every queue.
    pub async fn stats(&self) -> AppResult<Vec<QueueStats>> {
        let mut stats = Vec::with_capacity(JobKind::ALL.len());
        for kind in JobKind::ALL {
            let queue = self.queue(kind).ok_or_else(|| unavailable(kind))?;
            stats.push(queue.stats().await?);
        }
        Ok(stats)
    }
}

/// The error returned for any operation on an absent queue.
pub(crate) fn unavailable(kind: JobKind) -> AppError {
    AppError::broker_unavailable(format!(
        "Queue '{}' is unavailable: no broker configured",
        kind.queue_name()
    ))
}
