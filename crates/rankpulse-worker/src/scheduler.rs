//! In-process cron schedule for the daily fan-out.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;

use crate::fanout::FanOutScheduler;

/// Cron-based scheduler that triggers fan-out passes.
pub struct CronScheduler {
    /// The underlying job scheduler.
    scheduler: JobScheduler,
    /// Fan-out shared with the HTTP triggers.
    fanout: Arc<FanOutScheduler>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler.
    pub async fn new(fanout: Arc<FanOutScheduler>) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler, fanout })
    }

    /// Register the daily GSC sync fan-out at `expression`.
    pub async fn register_gsc_sync(&self, expression: &str, window_days: u32) -> AppResult<()> {
        let fanout = Arc::clone(&self.fanout);
        let job = CronJob::new_async(expression, move |_uuid, _lock| {
            let fanout = Arc::clone(&fanout);
            Box::pin(async move {
                tracing::info!(window_days, "Scheduled GSC sync fan-out starting");
                if let Err(e) = fanout.enqueue_daily_for_active_sites(window_days).await {
                    tracing::error!(error = %e, "Scheduled GSC sync fan-out failed");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid GSC sync schedule '{expression}': {e}"))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add GSC sync schedule: {e}")))?;

        tracing::info!(schedule = expression, window_days, "Registered: gsc_sync fan-out");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shut the scheduler down.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }
}
