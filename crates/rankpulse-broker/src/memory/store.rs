//! In-memory job broker.
//!
//! Mirrors the Redis layout (wait, delayed, active and failed sets per
//! queue) inside a single mutex. Jobs do not survive a restart, so this
//! backend is meant for tests and single-process embedding.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::types::job::{JobRecord, JobState, QueueCounts};

/// Failed entries kept per queue.
const FAILED_LIST_LIMIT: usize = 1000;

/// Sets of one queue. Ids enter `wait` at the front and leave at the back.
#[derive(Debug, Default)]
struct QueueState {
    wait: VecDeque<Uuid>,
    delayed: Vec<(DateTime<Utc>, Uuid)>,
    active: Vec<Uuid>,
    failed: VecDeque<Uuid>,
}

impl QueueState {
    fn promote_due(&mut self, now: DateTime<Utc>) -> usize {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = pending;
        due.sort_by_key(|(at, _)| *at);
        let promoted = due.len();
        for (_, id) in due {
            self.wait.push_front(id);
        }
        promoted
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn remove_active(&mut self, id: Uuid) -> bool {
        match self.active.iter().position(|a| *a == id) {
            Some(pos) => {
                self.active.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<Uuid, JobRecord>,
    queues: HashMap<String, QueueState>,
}

impl Inner {
    /// Promote due jobs and move the oldest waiting job to active.
    ///
    /// Returns the claimed record, or the next time a delayed job becomes
    /// due when nothing is ready.
    fn claim_next(
        &mut self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, Option<DateTime<Utc>>> {
        let state = self.queues.entry(queue.to_string()).or_default();
        let promoted = state.promote_due(now);
        if promoted > 0 {
            tracing::debug!(queue, promoted, "Promoted delayed jobs");
        }

        while let Some(id) = state.wait.pop_back() {
            let Some(record) = self.jobs.get_mut(&id) else {
                continue;
            };
            record.state = JobState::Active;
            record.claimed_at = Some(now);
            state.active.push(id);
            return Ok(record.clone());
        }

        Err(state.next_due())
    }
}

/// Job broker held entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    async fn push(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut record = job.clone();
        {
            let mut inner = self.inner.lock().await;
            let state = inner.queues.entry(queue.to_string()).or_default();
            match ready_at {
                Some(at) => {
                    record.state = JobState::Delayed;
                    state.delayed.push((at, record.id));
                }
                None => {
                    record.state = JobState::Waiting;
                    state.wait.push_front(record.id);
                }
            }
            inner.jobs.insert(record.id, record);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn claim(&self, queue: &str, wait: Duration) -> AppResult<Option<JobRecord>> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut inner = self.inner.lock().await;
                match inner.claim_next(queue, Utc::now()) {
                    Ok(record) => return Ok(Some(record)),
                    Err(next_due) => next_due,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let mut wake_at = deadline;
            if let Some(due) = next_due {
                let millis = (due - Utc::now()).num_milliseconds().max(0);
                let due_at = now + Duration::from_millis(u64::try_from(millis).unwrap_or(0));
                wake_at = wake_at.min(due_at);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn ack(&self, queue: &str, job_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner.queues.get_mut(queue) {
            state.remove_active(job_id);
        }
        inner.jobs.remove(&job_id);
        Ok(())
    }

    async fn release(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut record = job.clone();
        record.state = JobState::Delayed;
        {
            let mut inner = self.inner.lock().await;
            let state = inner.queues.entry(queue.to_string()).or_default();
            state.remove_active(record.id);
            state.delayed.push((ready_at, record.id));
            inner.jobs.insert(record.id, record);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn bury(&self, queue: &str, job: &JobRecord) -> AppResult<()> {
        let mut record = job.clone();
        record.state = JobState::Failed;

        let mut inner = self.inner.lock().await;
        let state = inner.queues.entry(queue.to_string()).or_default();
        state.remove_active(record.id);
        state.failed.push_front(record.id);
        let evicted = if state.failed.len() > FAILED_LIST_LIMIT {
            state.failed.pop_back()
        } else {
            None
        };
        inner.jobs.insert(record.id, record);
        if let Some(old) = evicted {
            inner.jobs.remove(&old);
        }
        Ok(())
    }

    async fn requeue_stalled(&self, queue: &str, claimed_before: DateTime<Utc>) -> AppResult<u64> {
        let requeued = {
            let mut inner = self.inner.lock().await;
            let Inner { jobs, queues } = &mut *inner;
            let Some(state) = queues.get_mut(queue) else {
                return Ok(0);
            };

            let (stalled, kept): (Vec<Uuid>, Vec<Uuid>) =
                state.active.drain(..).partition(|id| {
                    jobs.get(id)
                        .and_then(|r| r.claimed_at)
                        .is_none_or(|at| at < claimed_before)
                });
            state.active = kept;

            for id in &stalled {
                if let Some(record) = jobs.get_mut(id) {
                    record.state = JobState::Waiting;
                    record.claimed_at = None;
                    state.wait.push_front(*id);
                }
            }
            stalled.len() as u64
        };

        if requeued > 0 {
            self.notify.notify_waiters();
        }
        Ok(requeued)
    }

    async fn counts(&self, queue: &str) -> AppResult<QueueCounts> {
        let inner = self.inner.lock().await;
        Ok(inner
            .queues
            .get(queue)
            .map(|state| QueueCounts {
                waiting: state.wait.len() as u64,
                delayed: state.delayed.len() as u64,
                active: state.active.len() as u64,
                failed: state.failed.len() as u64,
            })
            .unwrap_or_default())
    }

    async fn ping(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rankpulse_core::types::backoff::BackoffPolicy;
    use rankpulse_core::types::job::{JobKind, JobOptions, JobPayload};

    fn make_job() -> JobRecord {
        JobRecord::new(
            JobKind::Crawl,
            JobPayload::for_site(Uuid::new_v4(), Uuid::new_v4()),
            JobOptions {
                attempts: 3,
                backoff: BackoffPolicy::exponential(100),
            },
        )
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let broker = MemoryBroker::new();
        let first = make_job();
        let second = make_job();
        broker.push("crawl", &first, None).await.unwrap();
        broker.push("crawl", &second, None).await.unwrap();

        let claimed = broker
            .claim("crawl", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.state, JobState::Active);
        assert!(claimed.claimed_at.is_some());

        let counts = broker.counts("crawl").await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.active, 1);
    }

    #[tokio::test]
    async fn test_claim_times_out_on_empty_queue() {
        let broker = MemoryBroker::new();
        let claimed = broker
            .claim("crawl", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claim_wakes_on_push() {
        let broker = MemoryBroker::new();
        let consumer = broker.clone();
        let waiter =
            tokio::spawn(async move { consumer.claim("crawl", Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = make_job();
        broker.push("crawl", &job, None).await.unwrap();

        let claimed = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
    }

    #[tokio::test]
    async fn test_delayed_job_becomes_claimable() {
        let broker = MemoryBroker::new();
        let job = make_job();
        let ready_at = Utc::now() + ChronoDuration::milliseconds(50);
        broker.push("crawl", &job, Some(ready_at)).await.unwrap();

        assert_eq!(broker.counts("crawl").await.unwrap().delayed, 1);
        let early = broker
            .claim("crawl", Duration::from_millis(5))
            .await
            .unwrap();
        assert!(early.is_none());

        let claimed = broker
            .claim("crawl", Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(broker.counts("crawl").await.unwrap().delayed, 0);
    }

    #[tokio::test]
    async fn test_release_and_bury_move_between_sets() {
        let broker = MemoryBroker::new();
        let job = make_job();
        broker.push("crawl", &job, None).await.unwrap();
        let mut claimed = broker
            .claim("crawl", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        let ready_at = claimed.schedule_retry("boom", Utc::now());
        broker.release("crawl", &claimed, ready_at).await.unwrap();
        let counts = broker.counts("crawl").await.unwrap();
        assert_eq!(counts.active, 0);
        assert_eq!(counts.delayed, 1);

        let mut again = broker
            .claim("crawl", Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.attempt, 2);

        again.mark_failed("boom", Utc::now());
        broker.bury("crawl", &again).await.unwrap();
        let counts = broker.counts("crawl").await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn test_ack_discards_job() {
        let broker = MemoryBroker::new();
        let job = make_job();
        broker.push("crawl", &job, None).await.unwrap();
        let claimed = broker
            .claim("crawl", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        broker.ack("crawl", claimed.id).await.unwrap();
        assert_eq!(broker.counts("crawl").await.unwrap(), QueueCounts::default());
    }

    #[tokio::test]
    async fn test_requeue_stalled_only_moves_old_claims() {
        let broker = MemoryBroker::new();
        broker.push("crawl", &make_job(), None).await.unwrap();
        broker
            .claim("crawl", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        let before_claim = Utc::now() - ChronoDuration::minutes(5);
        assert_eq!(broker.requeue_stalled("crawl", before_claim).await.unwrap(), 0);

        let after_claim = Utc::now() + ChronoDuration::seconds(1);
        assert_eq!(broker.requeue_stalled("crawl", after_claim).await.unwrap(), 1);
        let counts = broker.counts("crawl").await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let broker = MemoryBroker::new();
        broker.push("crawl", &make_job(), None).await.unwrap();
        let other = broker
            .claim("score", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(other.is_none());
        assert_eq!(broker.counts("crawl").await.unwrap().waiting, 1);
    }
}
