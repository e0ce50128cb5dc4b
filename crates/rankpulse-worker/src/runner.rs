//! Worker runner: claims jobs from one queue and executes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::time;

use rankpulse_core::config::WorkerConfig;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::types::job::{JobKind, JobRecord};

use crate::executor::{JobDispatcher, JobExecutionError, JobOutcome};
use crate::queue::{Queue, QueueRegistry};

/// Pause after a failed claim before trying again.
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Spawned but not yet consuming.
    Unattached,
    /// Claiming and executing jobs.
    Running,
    /// No longer claiming, waiting for in-flight jobs.
    Draining,
    /// Terminal.
    Stopped,
}

/// Runtime settings of a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Jobs executed at the same time.
    pub concurrency: usize,
    /// Limit on a single attempt.
    pub job_timeout: Duration,
    /// Claims older than this are requeued when the worker starts.
    pub stalled_after: Duration,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
            stalled_after: Duration::from_secs(config.stalled_after_seconds),
        }
    }
}

/// Control handle of a running worker.
///
/// Dropping the handle stops the worker from claiming new jobs.
#[derive(Debug)]
pub struct WorkerHandle {
    kind: JobKind,
    state: watch::Receiver<WorkerState>,
    cancel: watch::Sender<bool>,
}

impl WorkerHandle {
    /// Kind of the queue this worker consumes.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Stop claiming and wait for every in-flight job to finish.
    pub async fn drain(&self) {
        self.cancel.send_replace(true);
        self.join().await;
    }

    /// Wait until the worker has stopped.
    pub async fn join(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == WorkerState::Stopped).await;
    }
}

/// Start a worker for `kind`.
///
/// Returns `None` without spawning anything when the registry has no
/// broker. Must be called from within a Tokio runtime.
pub fn start_worker(
    registry: &QueueRegistry,
    kind: JobKind,
    dispatcher: Arc<JobDispatcher>,
    settings: &WorkerSettings,
) -> Option<WorkerHandle> {
    let Some(queue) = registry.queue(kind) else {
        tracing::info!(
            queue = kind.queue_name(),
            "Worker not started: no broker configured"
        );
        return None;
    };

    let (state_tx, state_rx) = watch::channel(WorkerState::Unattached);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let worker = Worker {
        queue,
        dispatcher,
        concurrency: settings.concurrency.max(1),
        job_timeout: settings.job_timeout,
        stalled_after: settings.stalled_after,
        claim_timeout: registry.claim_timeout(),
        state: state_tx,
    };
    tokio::spawn(worker.run(cancel_rx));

    Some(WorkerHandle {
        kind,
        state: state_rx,
        cancel: cancel_tx,
    })
}

struct Worker {
    queue: Queue,
    dispatcher: Arc<JobDispatcher>,
    concurrency: usize,
    job_timeout: Duration,
    stalled_after: Duration,
    claim_timeout: Duration,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
        tracing::info!(queue = self.queue.name(), state = ?state, "Worker state changed");
    }

    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let name = self.queue.name();
        let broker = Arc::clone(self.queue.broker());

        let cutoff = stalled_cutoff(Utc::now(), self.stalled_after);
        match broker.requeue_stalled(name, cutoff).await {
            Ok(0) => {}
            Ok(requeued) => tracing::warn!(queue = name, requeued, "Requeued stalled jobs"),
            Err(e) => tracing::warn!(queue = name, error = %e, "Failed to requeue stalled jobs"),
        }

        self.set_state(WorkerState::Running);
        tracing::info!(
            queue = name,
            concurrency = self.concurrency,
            job_timeout_secs = self.job_timeout.as_secs(),
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        loop {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claim = broker.claim(name, self.claim_timeout);
            tokio::pin!(claim);
            let claimed = tokio::select! {
                claimed = &mut claim => claimed,
                _ = cancel.changed() => {
                    self.set_state(WorkerState::Draining);
                    if let Ok(Some(job)) = claim.await {
                        hand_back(broker.as_ref(), name, &job).await;
                    }
                    break;
                }
            };

            match claimed {
                Ok(Some(job)) => {
                    tracing::debug!(queue = name, job_id = %job.id, attempt = job.attempt, "Claimed job");
                    let broker = Arc::clone(&broker);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let job_timeout = self.job_timeout;
                    tokio::spawn(async move {
                        let _permit = permit;
                        process_job(broker.as_ref(), &dispatcher, name, job, job_timeout).await;
                    });
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    tracing::error!(queue = name, error = %e, "Failed to claim job");
                    tokio::select! {
                        _ = cancel.changed() => {}
                        _ = time::sleep(CLAIM_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        if *self.state.borrow() != WorkerState::Draining {
            self.set_state(WorkerState::Draining);
        }

        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        let _ = semaphore.acquire_many(permits).await;

        self.set_state(WorkerState::Stopped);
    }
}

/// Return a job claimed after cancellation without spending an attempt.
async fn hand_back(broker: &dyn JobBroker, queue: &str, job: &JobRecord) {
    match broker.release(queue, job, Utc::now()).await {
        Ok(()) => tracing::info!(queue, job_id = %job.id, "Returned job claimed while draining"),
        Err(e) => tracing::error!(
            queue,
            job_id = %job.id,
            error = %e,
            "Failed to return job claimed while draining"
        ),
    }
}

/// Run one attempt and settle the job with the broker.
async fn process_job(
    broker: &dyn JobBroker,
    dispatcher: &JobDispatcher,
    queue: &str,
    mut job: JobRecord,
    job_timeout: Duration,
) {
    tracing::info!(
        queue,
        job_id = %job.id,
        site_id = %job.payload.site_id,
        attempt = job.attempt,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    let result = match time::timeout(job_timeout, dispatcher.execute(&job)).await {
        Ok(result) => result,
        Err(_) => Err(JobExecutionError::TimedOut(job_timeout)),
    };

    match result {
        Ok(outcome) => {
            if let Err(e) = broker.ack(queue, job.id).await {
                tracing::error!(queue, job_id = %job.id, error = %e, "Failed to acknowledge job");
                return;
            }
            match outcome {
                JobOutcome::Completed => tracing::info!(queue, job_id = %job.id, "Job completed"),
                JobOutcome::Skipped(reason) => {
                    tracing::info!(queue, job_id = %job.id, reason = %reason, "Job skipped")
                }
            }
        }
        Err(err) if err.is_retryable() && job.has_attempts_left() => {
            let message = err.to_string();
            let failed_attempt = job.attempt;
            let delay_ms = job.backoff.delay_ms(failed_attempt);
            let ready_at = job.schedule_retry(&message, Utc::now());
            tracing::warn!(
                queue,
                job_id = %job.id,
                attempt = failed_attempt,
                max_attempts = job.max_attempts,
                delay_ms,
                error = %message,
                "Job failed, retry scheduled"
            );
            if let Err(e) = broker.release(queue, &job, ready_at).await {
                tracing::error!(queue, job_id = %job.id, error = %e, "Failed to schedule retry");
            }
        }
        Err(err) => {
            let message = err.to_string();
            job.mark_failed(&message, Utc::now());
            tracing::error!(
                queue,
                job_id = %job.id,
                attempt = job.attempt,
                max_attempts = job.max_attempts,
                retryable = err.is_retryable(),
                error = %message,
                "Job failed terminally"
            );
            if let Err(e) = broker.bury(queue, &job).await {
                tracing::error!(queue, job_id = %job.id, error = %e, "Failed to record job failure");
            }
        }
    }
}

fn stalled_cutoff(now: DateTime<Utc>, stalled_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stalled_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
