//! Broker trait for durable job storage.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::result::AppResult;
use crate::types::job::{JobRecord, QueueCounts};

/// A durable store of jobs organised in named queues.
///
/// The broker is the single authority over which consumer owns a job:
/// `claim` is atomic across every process connected to it. Delivery is
/// at-least-once; a claimed job that is never acknowledged is handed out
/// again after `requeue_stalled`.
#[async_trait]
pub trait JobBroker: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a job and make it waiting, or delayed until `ready_at`.
    async fn push(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Claim the next ready job, blocking for at most `wait`.
    ///
    /// Due delayed jobs are promoted before claiming. The returned record
    /// is in the active set with `claimed_at` stamped.
    async fn claim(&self, queue: &str, wait: Duration) -> AppResult<Option<JobRecord>>;

    /// Acknowledge a successful job and discard it.
    async fn ack(&self, queue: &str, job_id: Uuid) -> AppResult<()>;

    /// Return a failed job to the queue as its next attempt, claimable at
    /// `ready_at`.
    async fn release(&self, queue: &str, job: &JobRecord, ready_at: DateTime<Utc>)
    -> AppResult<()>;

    /// Move a job to the terminal failed list.
    async fn bury(&self, queue: &str, job: &JobRecord) -> AppResult<()>;

    /// Put active jobs claimed before `claimed_before` back to waiting.
    ///
    /// Returns how many jobs were requeued.
    async fn requeue_stalled(&self, queue: &str, claimed_before: DateTime<Utc>) -> AppResult<u64>;

    /// Current set sizes for a queue.
    async fn counts(&self, queue: &str) -> AppResult<QueueCounts>;

    /// Check that the broker is reachable.
    async fn ping(&self) -> AppResult<bool>;
}
