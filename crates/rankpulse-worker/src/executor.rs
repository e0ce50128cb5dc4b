//! Job dispatcher: routes claimed jobs to the handler for their kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rankpulse_core::error::AppError;
use rankpulse_core::types::job::{JobKind, JobRecord};

/// What a handler reports when a job finishes without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The work was done.
    Completed,
    /// Nothing needed doing, with the reason.
    Skipped(String),
}

/// Trait for job handler implementations.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The job kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Execute one attempt of the job.
    ///
    /// Delivery is at-least-once, so the same attempt may be executed more
    /// than once.
    async fn execute(&self, job: &JobRecord) -> Result<JobOutcome, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure, do not retry.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure, retried with backoff.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// Infrastructure error raised while running the job.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),

    /// The attempt ran past the per-job timeout.
    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),
}

impl JobExecutionError {
    /// Whether the failure may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Dispatches jobs to the handler registered for their kind.
#[derive(Debug, Default)]
pub struct JobDispatcher {
    /// Registered job handlers by kind.
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl JobDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        tracing::info!(kind = %kind, "Registered job handler");
        self.handlers.insert(kind, handler);
    }

    /// Execute a job with the handler for its kind.
    pub async fn execute(&self, job: &JobRecord) -> Result<JobOutcome, JobExecutionError> {
        let handler = self.handlers.get(&job.kind).ok_or_else(|| {
            JobExecutionError::Permanent(format!("No handler registered for '{}'", job.kind))
        })?;

        tracing::debug!(
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempt,
            max_attempts = job.max_attempts,
            "Executing job"
        );

        handler.execute(job).await
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Kinds with a registered handler.
    pub fn registered_kinds(&self) -> Vec<JobKind> {
        self.handlers.keys().copied().collect()
    }
}
