//! Sync-run log repository.

use async_trait::async_trait;
use sqlx::PgPool;

use rankpulse_core::error::{AppError, ErrorKind};
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::repository::SyncRunRepository;
use rankpulse_core::types::job::JobRecord;

/// Writes one row per job attempt into `sync_runs`.
#[derive(Debug, Clone)]
pub struct PgSyncRunRepository {
    pool: PgPool,
}

impl PgSyncRunRepository {
    /// Create a new sync-run repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncRunRepository for PgSyncRunRepository {
    async fn record_run(&self, job: &JobRecord) -> AppResult<bool> {
        let window_days = job
            .payload
            .window_days
            .map(i32::try_from)
            .transpose()
            .map_err(|_| AppError::validation("Window does not fit in a sync run row"))?;
        let attempt = i32::try_from(job.attempt)
            .map_err(|_| AppError::validation("Attempt does not fit in a sync run row"))?;

        let result = sqlx::query(
            "INSERT INTO sync_runs (job_id, attempt, kind, site_id, organization_id, window_days) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (job_id, attempt) DO NOTHING",
        )
        .bind(job.id)
        .bind(attempt)
        .bind(job.kind.queue_name())
        .bind(job.payload.site_id)
        .bind(job.payload.organization_id)
        .bind(window_days)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let site_missing =
                matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
            if site_missing {
                AppError::with_source(
                    ErrorKind::NotFound,
                    format!("Site {} no longer exists", job.payload.site_id),
                    e,
                )
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to record sync run", e)
            }
        })?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            tracing::debug!(job_id = %job.id, attempt = job.attempt, "Sync run already recorded");
        }
        Ok(inserted)
    }
}
