//! Repository capabilities consumed by the scheduling core.

use async_trait::async_trait;
use uuid::Uuid;

use crate::result::AppResult;
use crate::types::job::JobRecord;
use crate::types::site::EligibleSite;

/// Read access to site eligibility.
#[async_trait]
pub trait SiteRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Sites that are active and hold a valid refresh token.
    async fn find_eligible_sites(&self) -> AppResult<Vec<EligibleSite>>;

    /// Every active site, regardless of token state.
    async fn find_active_sites(&self) -> AppResult<Vec<EligibleSite>>;

    /// Current projection of one site.
    async fn find_site(&self, site_id: Uuid) -> AppResult<Option<EligibleSite>>;
}

/// Write access to the sync-run log picked up by the data pipeline.
#[async_trait]
pub trait SyncRunRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Record that an attempt of this job ran.
    ///
    /// Must be idempotent per (job id, attempt) so redelivered jobs do not
    /// produce duplicate runs. Returns `false` when the run already existed
    /// and a `NotFound` error when the site has been deleted.
    async fn record_run(&self, job: &JobRecord) -> AppResult<bool>;
}
