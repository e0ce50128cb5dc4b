//! Job records, kinds, payloads and options.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use crate::error::AppError;
use crate::result::AppResult;

/// The kinds of work RankPulse runs in the background. Each kind has its
/// own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Pull search-console data for a site.
    GscSync,
    /// Fetch page performance metrics.
    Performance,
    /// Crawl a site.
    Crawl,
    /// Recompute a site's score.
    Score,
}

impl JobKind {
    /// Every kind, in queue-registration order.
    pub const ALL: [JobKind; 4] = [Self::GscSync, Self::Performance, Self::Crawl, Self::Score];

    /// Broker queue name for this kind.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::GscSync => "gsc-sync",
            Self::Performance => "performance",
            Self::Crawl => "crawl",
            Self::Score => "score",
        }
    }

    /// Whether jobs of this kind talk to search console and so need a
    /// valid refresh token on the site.
    pub fn requires_search_console(&self) -> bool {
        matches!(self, Self::GscSync | Self::Performance)
    }

    /// Whether the payload must carry a lookback window.
    pub fn requires_window(&self) -> bool {
        matches!(self, Self::GscSync | Self::Performance)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.queue_name() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown job kind '{s}'")))
    }
}

/// Longest lookback window search console serves, in days.
pub const MAX_WINDOW_DAYS: u32 = 540;

/// Payload carried by every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Site the job works on.
    pub site_id: Uuid,
    /// Tenant owning the site.
    pub organization_id: Uuid,
    /// Lookback window in days, for search-console kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
}

impl JobPayload {
    /// Payload for a site without a window.
    pub fn for_site(site_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            site_id,
            organization_id,
            window_days: None,
        }
    }

    /// Attach a lookback window.
    pub fn with_window(mut self, days: u32) -> Self {
        self.window_days = Some(days);
        self
    }

    /// Check the payload is processable for `kind`.
    pub fn validate_for(&self, kind: JobKind) -> AppResult<()> {
        validate_window(kind, self.window_days)
    }
}

/// Check a lookback window against the rules for `kind`.
pub fn validate_window(kind: JobKind, window_days: Option<u32>) -> AppResult<()> {
    match window_days {
        None if kind.requires_window() => Err(AppError::validation(format!(
            "{kind} jobs require a window"
        ))),
        Some(days) if !(1..=MAX_WINDOW_DAYS).contains(&days) => Err(AppError::validation(
            format!("Window of {days} days is outside 1..={MAX_WINDOW_DAYS}"),
        )),
        _ => Ok(()),
    }
}

/// Effective options of a job: attempts ceiling and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Backoff between attempts.
    pub backoff: BackoffPolicy,
}

impl JobOptions {
    /// Check attempts and backoff.
    pub fn validate(&self) -> AppResult<()> {
        if self.attempts == 0 {
            return Err(AppError::configuration("Job attempts must be at least 1"));
        }
        self.backoff.validate()
    }

    /// Merge per-enqueue overrides onto these defaults.
    pub fn apply(&self, overrides: &JobOptionsOverride) -> AppResult<JobOptions> {
        let merged = JobOptions {
            attempts: overrides.attempts.unwrap_or(self.attempts),
            backoff: overrides.backoff.unwrap_or(self.backoff),
        };
        merged
            .validate()
            .map_err(|e| AppError::validation(format!("Invalid job options: {}", e.message)))?;
        Ok(merged)
    }
}

/// Per-enqueue overrides. Unset fields inherit the queue defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptionsOverride {
    /// Replace the attempts ceiling.
    pub attempts: Option<u32>,
    /// Replace the backoff policy.
    pub backoff: Option<BackoffPolicy>,
    /// Hold the job for this many milliseconds before it can be claimed.
    pub delay_ms: Option<u64>,
}

/// Where a job is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to be claimed.
    Waiting,
    /// Waiting for a backoff or start delay to elapse.
    Delayed,
    /// Claimed by a worker.
    Active,
    /// Exhausted its attempts or failed permanently.
    Failed,
}

impl JobState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as stored by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier.
    pub id: Uuid,
    /// Kind, which also names the queue.
    pub kind: JobKind,
    /// Work parameters.
    pub payload: JobPayload,
    /// 1-indexed number of the current (or next) attempt.
    pub attempt: u32,
    /// Attempts ceiling inherited from the queue unless overridden.
    pub max_attempts: u32,
    /// Backoff inherited from the queue unless overridden.
    pub backoff: BackoffPolicy,
    /// Current state.
    pub state: JobState,
    /// Error from the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the current attempt was claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Build a fresh record on its first attempt.
    pub fn new(kind: JobKind, payload: JobPayload, options: JobOptions) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            payload,
            attempt: 1,
            max_attempts: options.attempts,
            backoff: options.backoff,
            state: JobState::Waiting,
            last_error: None,
            created_at: Utc::now(),
            claimed_at: None,
            failed_at: None,
        }
    }

    /// Whether another attempt is allowed after the current one fails.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Record a failed attempt and advance to the next one.
    ///
    /// Returns the time the next attempt becomes claimable.
    pub fn schedule_retry(&mut self, error: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay_ms = self.backoff.delay_ms(self.attempt);
        self.last_error = Some(error.to_string());
        self.attempt += 1;
        self.state = JobState::Delayed;
        self.claimed_at = None;
        ready_after(now, delay_ms)
    }

    /// Move the record to the terminal failed state.
    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.last_error = Some(error.to_string());
        self.state = JobState::Failed;
        self.failed_at = Some(now);
    }

    /// Handle returned to the caller that enqueued this record.
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            kind: self.kind,
            queue: self.kind.queue_name().to_string(),
        }
    }
}

/// `now` plus `delay_ms`, saturating at the latest representable time.
pub fn ready_after(now: DateTime<Utc>, delay_ms: u64) -> DateTime<Utc> {
    i64::try_from(delay_ms)
        .ok()
        .and_then(ChronoDuration::try_milliseconds)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returned by enqueue once the broker has recorded the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Job identifier.
    pub id: Uuid,
    /// Job kind.
    pub kind: JobKind,
    /// Queue the job was placed on.
    pub queue: String,
}

/// Sizes of a queue's sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Ready to be claimed.
    pub waiting: u64,
    /// Waiting on a delay.
    pub delayed: u64,
    /// Claimed by a worker.
    pub active: u64,
    /// Terminally failed.
    pub failed: u64,
}
