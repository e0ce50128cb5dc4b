//! Fan-out: one job per eligible site.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use rankpulse_core::result::AppResult;
use rankpulse_core::traits::repository::SiteRepository;
use rankpulse_core::types::job::{JobKind, JobOptionsOverride, JobPayload, validate_window};
use rankpulse_core::types::site::EligibleSite;

use crate::queue::{QueueRegistry, unavailable};

/// Enqueue calls in flight at once during a pass.
const ENQUEUE_CONCURRENCY: usize = 16;

/// Result of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutSummary {
    /// Jobs the broker accepted.
    pub enqueued: u64,
    /// Eligible sites whose enqueue failed.
    pub skipped: u64,
}

/// Expands a scheduling trigger into per-site jobs.
#[derive(Debug, Clone)]
pub struct FanOutScheduler {
    registry: Arc<QueueRegistry>,
    sites: Arc<dyn SiteRepository>,
}

impl FanOutScheduler {
    /// Create a fan-out scheduler.
    pub fn new(registry: Arc<QueueRegistry>, sites: Arc<dyn SiteRepository>) -> Self {
        Self { registry, sites }
    }

    /// Enqueue one GSC sync job per active site holding a valid refresh token.
    pub async fn enqueue_daily_for_active_sites(&self, window_days: u32) -> AppResult<FanOutSummary> {
        self.enqueue_for_active_sites(JobKind::GscSync, Some(window_days))
            .await
    }

    /// Enqueue one `kind` job per eligible site.
    ///
    /// Fails fast with `BrokerUnavailable` when the queue is absent, before
    /// the repository is read. Individual enqueue failures are counted as
    /// skipped and do not abort the pass.
    pub async fn enqueue_for_active_sites(
        &self,
        kind: JobKind,
        window_days: Option<u32>,
    ) -> AppResult<FanOutSummary> {
        let queue = self.registry.queue(kind).ok_or_else(|| unavailable(kind))?;

        validate_window(kind, window_days)?;

        let snapshot = if kind.requires_search_console() {
            self.sites.find_eligible_sites().await?
        } else {
            self.sites.find_active_sites().await?
        };
        let total = snapshot.len();
        let targets = eligible_targets(snapshot, kind);
        let ineligible = total - targets.len();

        let overrides = JobOptionsOverride::default();
        let summary = stream::iter(targets)
            .map(|site| {
                let queue = &queue;
                let overrides = &overrides;
                async move {
                    let payload = JobPayload {
                        site_id: site.site_id,
                        organization_id: site.organization_id,
                        window_days,
                    };
                    match queue.enqueue(payload, overrides).await {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::warn!(
                                queue = kind.queue_name(),
                                site_id = %site.site_id,
                                error = %e,
                                "Failed to enqueue job for site"
                            );
                            false
                        }
                    }
                }
            })
            .buffer_unordered(ENQUEUE_CONCURRENCY)
            .fold(FanOutSummary::default(), |mut summary, accepted| async move {
                if accepted {
                    summary.enqueued += 1;
                } else {
                    summary.skipped += 1;
                }
                summary
            })
            .await;

        tracing::info!(
            queue = kind.queue_name(),
            window_days = ?window_days,
            enqueued = summary.enqueued,
            skipped = summary.skipped,
            ineligible,
            "Fan-out complete"
        );
        Ok(summary)
    }
}

/// Sites in the snapshot that qualify for `kind`, each at most once.
fn eligible_targets(snapshot: Vec<EligibleSite>, kind: JobKind) -> Vec<EligibleSite> {
    let mut seen = HashSet::new();
    snapshot
        .into_iter()
        .filter(|site| site.is_eligible_for(kind))
        .filter(|site| seen.insert(site.site_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rankpulse_broker::MemoryBroker;
    use rankpulse_core::config::QueuesConfig;
    use rankpulse_core::error::ErrorKind;
    use rankpulse_core::traits::broker::JobBroker;

    use crate::testing::{FailingBroker, FakeSites, site};

    fn scheduler(
        broker: Option<Arc<dyn JobBroker>>,
        sites: Arc<FakeSites>,
    ) -> FanOutScheduler {
        let registry =
            QueueRegistry::build(broker, &QueuesConfig::default(), Duration::from_millis(10))
                .unwrap();
        FanOutScheduler::new(Arc::new(registry), sites)
    }

    fn mixed_sites() -> Vec<EligibleSite> {
        let mut sites: Vec<_> = (0..3).map(|_| site(true, true)).collect();
        sites.extend((0..2).map(|_| site(false, true)));
        sites.extend((0..5).map(|_| site(true, false)));
        sites
    }

    #[tokio::test]
    async fn test_all_eligible_sites_enqueued() {
        let broker = Arc::new(MemoryBroker::new());
        let sites = Arc::new(FakeSites::new((0..10).map(|_| site(true, true)).collect()));
        let fanout = scheduler(Some(broker.clone()), sites);

        let summary = fanout.enqueue_daily_for_active_sites(30).await.unwrap();
        assert_eq!(summary, FanOutSummary { enqueued: 10, skipped: 0 });
        assert_eq!(broker.counts("gsc-sync").await.unwrap().waiting, 10);
    }

    #[tokio::test]
    async fn test_ineligible_sites_are_filtered_not_skipped() {
        let broker = Arc::new(MemoryBroker::new());
        let sites = Arc::new(FakeSites::unfiltered(mixed_sites()));
        let fanout = scheduler(Some(broker.clone()), sites);

        let summary = fanout.enqueue_daily_for_active_sites(30).await.unwrap();
        assert_eq!(summary, FanOutSummary { enqueued: 3, skipped: 0 });
    }

    #[tokio::test]
    async fn test_each_job_carries_site_and_window() {
        let broker = Arc::new(MemoryBroker::new());
        let only = site(true, true);
        let sites = Arc::new(FakeSites::new(vec![only.clone()]));
        let fanout = scheduler(Some(broker.clone()), sites);

        fanout.enqueue_daily_for_active_sites(90).await.unwrap();
        let job = broker
            .claim("gsc-sync", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.kind, JobKind::GscSync);
        assert_eq!(job.payload.site_id, only.site_id);
        assert_eq!(job.payload.organization_id, only.organization_id);
        assert_eq!(job.payload.window_days, Some(90));
    }

    #[tokio::test]
    async fn test_one_failed_enqueue_is_counted_as_skipped() {
        let eligible: Vec<_> = (0..5).map(|_| site(true, true)).collect();
        let broker = Arc::new(FailingBroker::failing_for([eligible[2].site_id]));
        let sites = Arc::new(FakeSites::new(eligible));
        let fanout = scheduler(Some(broker.clone()), sites);

        let summary = fanout.enqueue_daily_for_active_sites(30).await.unwrap();
        assert_eq!(summary, FanOutSummary { enqueued: 4, skipped: 1 });
        assert_eq!(broker.counts("gsc-sync").await.unwrap().waiting, 4);
    }

    #[tokio::test]
    async fn test_absent_queue_fails_before_reading_sites() {
        let sites = Arc::new(FakeSites::new(vec![site(true, true)]));
        let fanout = scheduler(None, sites.clone());

        let err = fanout.enqueue_daily_for_active_sites(30).await.unwrap_err();
        assert!(err.is_broker_unavailable());
        assert_eq!(sites.queries(), 0);
    }

    #[tokio::test]
    async fn test_repository_error_propagates() {
        let sites = Arc::new(FakeSites::new(vec![site(true, true)]));
        sites.set_failing(true);
        let fanout = scheduler(Some(Arc::new(MemoryBroker::new())), sites);

        let err = fanout.enqueue_daily_for_active_sites(30).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_eligibility_is_read_fresh_each_pass() {
        let broker = Arc::new(MemoryBroker::new());
        let active = site(true, true);
        let sites = Arc::new(FakeSites::new(vec![active.clone()]));
        let fanout = scheduler(Some(broker.clone()), sites.clone());

        assert_eq!(fanout.enqueue_daily_for_active_sites(30).await.unwrap().enqueued, 1);

        sites.replace(vec![EligibleSite {
            is_active: false,
            ..active
        }]);
        assert_eq!(fanout.enqueue_daily_for_active_sites(30).await.unwrap().enqueued, 0);
        assert_eq!(sites.queries(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_sites_enqueue_once() {
        let broker = Arc::new(MemoryBroker::new());
        let dup = site(true, true);
        let sites = Arc::new(FakeSites::new(vec![dup.clone(), dup]));
        let fanout = scheduler(Some(broker.clone()), sites);

        let summary = fanout.enqueue_daily_for_active_sites(30).await.unwrap();
        assert_eq!(summary.enqueued, 1);
    }

    #[tokio::test]
    async fn test_crawl_needs_only_active_sites() {
        let broker = Arc::new(MemoryBroker::new());
        let sites = Arc::new(FakeSites::unfiltered(mixed_sites()));
        let fanout = scheduler(Some(broker.clone()), sites);

        let summary = fanout
            .enqueue_for_active_sites(JobKind::Crawl, None)
            .await
            .unwrap();
        assert_eq!(summary, FanOutSummary { enqueued: 8, skipped: 0 });
    }

    #[tokio::test]
    async fn test_invalid_window_is_rejected() {
        let sites = Arc::new(FakeSites::new(vec![site(true, true)]));
        let fanout = scheduler(Some(Arc::new(MemoryBroker::new())), sites.clone());

        let err = fanout.enqueue_daily_for_active_sites(0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = fanout
            .enqueue_for_active_sites(JobKind::Performance, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(sites.queries(), 0);
    }
}
