//! Sync-run handler: records a run for the downstream data pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use rankpulse_core::error::ErrorKind;
use rankpulse_core::traits::repository::{SiteRepository, SyncRunRepository};
use rankpulse_core::types::job::{JobKind, JobRecord};

use crate::executor::{JobExecutionError, JobHandler, JobOutcome};

/// Handles one job kind by validating the payload, re-checking the site
/// and logging a sync run.
#[derive(Debug)]
pub struct SyncRunHandler {
    kind: JobKind,
    sites: Arc<dyn SiteRepository>,
    runs: Arc<dyn SyncRunRepository>,
}

impl SyncRunHandler {
    /// Create a handler for `kind`.
    pub fn new(
        kind: JobKind,
        sites: Arc<dyn SiteRepository>,
        runs: Arc<dyn SyncRunRepository>,
    ) -> Self {
        Self { kind, sites, runs }
    }
}

#[async_trait]
impl JobHandler for SyncRunHandler {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn execute(&self, job: &JobRecord) -> Result<JobOutcome, JobExecutionError> {
        job.payload
            .validate_for(self.kind)
            .map_err(|e| JobExecutionError::Permanent(e.message))?;

        let Some(site) = self.sites.find_site(job.payload.site_id).await? else {
            return Ok(JobOutcome::Skipped("site no longer exists".to_string()));
        };
        if site.organization_id != job.payload.organization_id {
            return Err(JobExecutionError::Permanent(format!(
                "Site {} does not belong to organization {}",
                site.site_id, job.payload.organization_id
            )));
        }
        if !site.is_eligible_for(self.kind) {
            return Ok(JobOutcome::Skipped("site is no longer eligible".to_string()));
        }

        match self.runs.record_run(job).await {
            Ok(true) => Ok(JobOutcome::Completed),
            Ok(false) => {
                tracing::debug!(job_id = %job.id, attempt = job.attempt, "Duplicate delivery");
                Ok(JobOutcome::Skipped("run already recorded".to_string()))
            }
            Err(e) if e.kind == ErrorKind::NotFound => {
                Ok(JobOutcome::Skipped("site no longer exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
