//! Fakes shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rankpulse_broker::MemoryBroker;
use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::traits::repository::{SiteRepository, SyncRunRepository};
use rankpulse_core::types::backoff::BackoffPolicy;
use rankpulse_core::types::job::{JobKind, JobOptions, JobPayload, JobRecord, QueueCounts};
use rankpulse_core::types::site::EligibleSite;

use crate::executor::{JobExecutionError, JobHandler, JobOutcome};

pub fn site(is_active: bool, has_valid_refresh_token: bool) -> EligibleSite {
    EligibleSite {
        site_id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        is_active,
        has_valid_refresh_token,
    }
}

pub fn job(kind: JobKind) -> JobRecord {
    let payload = JobPayload::for_site(Uuid::new_v4(), Uuid::new_v4()).with_window(30);
    JobRecord::new(
        kind,
        payload,
        JobOptions {
            attempts: 3,
            backoff: BackoffPolicy::fixed(10),
        },
    )
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Transient,
    Permanent,
}

/// Handler that fails a set number of times, then succeeds.
#[derive(Debug)]
pub struct ScriptedHandler {
    kind: JobKind,
    failures_left: AtomicU32,
    failure: Failure,
    delay: Duration,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl ScriptedHandler {
    fn new(kind: JobKind, failures: u32, failure: Failure, delay: Duration) -> Self {
        Self {
            kind,
            failures_left: AtomicU32::new(failures),
            failure,
            delay,
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    pub fn succeeding(kind: JobKind) -> Self {
        Self::new(kind, 0, Failure::Transient, Duration::ZERO)
    }

    pub fn failing_times(kind: JobKind, failures: u32) -> Self {
        Self::new(kind, failures, Failure::Transient, Duration::ZERO)
    }

    pub fn permanent(kind: JobKind) -> Self {
        Self::new(kind, u32::MAX, Failure::Permanent, Duration::ZERO)
    }

    pub fn slow(kind: JobKind, delay: Duration) -> Self {
        Self::new(kind, 0, Failure::Transient, delay)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn execute(&self, _job: &JobRecord) -> Result<JobOutcome, JobExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !failed {
            return Ok(JobOutcome::Completed);
        }
        match self.failure {
            Failure::Transient => Err(JobExecutionError::Transient("upstream 503".into())),
            Failure::Permanent => Err(JobExecutionError::Permanent("bad payload".into())),
        }
    }
}

/// Poll `check` until it holds, for at most two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Site repository over a fixed list.
#[derive(Debug, Default)]
pub struct FakeSites {
    sites: Mutex<Vec<EligibleSite>>,
    unfiltered: bool,
    failing: AtomicBool,
    queries: AtomicU32,
}

impl FakeSites {
    pub fn new(sites: Vec<EligibleSite>) -> Self {
        Self {
            sites: Mutex::new(sites),
            ..Default::default()
        }
    }

    /// Returns every site from every query, leaving filtering to the caller.
    pub fn unfiltered(sites: Vec<EligibleSite>) -> Self {
        Self {
            unfiltered: true,
            ..Self::new(sites)
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn replace(&self, sites: Vec<EligibleSite>) {
        *self.sites.lock().unwrap() = sites;
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    fn select(&self, keep: impl Fn(&EligibleSite) -> bool) -> AppResult<Vec<EligibleSite>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::database("connection refused"));
        }
        let sites = self.sites.lock().unwrap();
        Ok(sites
            .iter()
            .filter(|s| self.unfiltered || keep(*s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SiteRepository for FakeSites {
    async fn find_eligible_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.select(EligibleSite::is_eligible)
    }

    async fn find_active_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.select(|s| s.is_active)
    }

    async fn find_site(&self, site_id: Uuid) -> AppResult<Option<EligibleSite>> {
        Ok(self.select(|_| true)?.into_iter().find(|s| s.site_id == site_id))
    }
}

/// Sync-run log keyed by (job id, attempt).
#[derive(Debug, Default)]
pub struct FakeRuns {
    runs: Mutex<HashSet<(Uuid, u32)>>,
    deleted_sites: Mutex<HashSet<Uuid>>,
}

impl FakeRuns {
    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    /// Make later inserts for this site fail as the database would.
    pub fn delete_site(&self, site_id: Uuid) {
        self.deleted_sites.lock().unwrap().insert(site_id);
    }
}

#[async_trait]
impl SyncRunRepository for FakeRuns {
    async fn record_run(&self, job: &JobRecord) -> AppResult<bool> {
        if self.deleted_sites.lock().unwrap().contains(&job.payload.site_id) {
            return Err(AppError::not_found("site no longer exists"));
        }
        Ok(self.runs.lock().unwrap().insert((job.id, job.attempt)))
    }
}

/// Memory broker that refuses pushes for chosen sites.
#[derive(Debug, Default)]
pub struct FailingBroker {
    inner: MemoryBroker,
    fail_sites: HashSet<Uuid>,
}

impl FailingBroker {
    pub fn failing_for(sites: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            inner: MemoryBroker::new(),
            fail_sites: sites.into_iter().collect(),
        }
    }
}

#[async_trait]
impl JobBroker for FailingBroker {
    async fn push(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        if self.fail_sites.contains(&job.payload.site_id) {
            return Err(AppError::broker_unavailable("connection reset by peer"));
        }
        self.inner.push(queue, job, ready_at).await
    }

    async fn claim(&self, queue: &str, wait: Duration) -> AppResult<Option<JobRecord>> {
        self.inner.claim(queue, wait).await
    }

    async fn ack(&self, queue: &str, job_id: Uuid) -> AppResult<()> {
        self.inner.ack(queue, job_id).await
    }

    async fn release(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.inner.release(queue, job, ready_at).await
    }

    async fn bury(&self, queue: &str, job: &JobRecord) -> AppResult<()> {
        self.inner.bury(queue, job).await
    }

    async fn requeue_stalled(&self, queue: &str, claimed_before: DateTime<Utc>) -> AppResult<u64> {
        self.inner.requeue_stalled(queue, claimed_before).await
    }

    async fn counts(&self, queue: &str) -> AppResult<QueueCounts> {
        self.inner.counts(queue).await
    }

    async fn ping(&self) -> AppResult<bool> {
        self.inner.ping().await
    }
}
