//! Shared domain types: jobs, backoff policies and site projections.

pub mod backoff;
pub mod job;
pub mod site;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use job::{
    JobHandle, JobKind, JobOptions, JobOptionsOverride, JobPayload, JobRecord, JobState,
    QueueCounts,
};
pub use site::EligibleSite;
