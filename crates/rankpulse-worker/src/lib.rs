//! Background job processing for RankPulse.
//!
//! This crate provides:
//! - A queue registry that hands out queues only when a broker is configured
//! - A worker runner that claims and executes jobs with retry and backoff
//! - A job dispatcher that routes jobs to the handler for their kind
//! - A fan-out scheduler that turns eligible sites into per-site jobs
//! - A cron scheduler for the in-process daily fan-out
//! - The built-in sync-run job handler

pub mod executor;
pub mod fanout;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{JobDispatcher, JobExecutionError, JobHandler, JobOutcome};
pub use fanout::{FanOutScheduler, FanOutSummary};
pub use queue::{Queue, QueueRegistry, QueueStats};
pub use runner::{WorkerHandle, WorkerState, start_worker};
pub use scheduler::CronScheduler;
