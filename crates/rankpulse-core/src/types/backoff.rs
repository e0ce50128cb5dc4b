//! Retry backoff policy.
//!
//! The policy is a pure function of the attempt number so its numbers can
//! be checked without a broker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;

/// Backoff strategy between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles on each retry.
    Exponential,
}

impl BackoffKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

/// Backoff descriptor attached to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Strategy.
    pub kind: BackoffKind,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Optional upper bound on any single delay, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl BackoffPolicy {
    /// Fixed delay policy.
    pub fn fixed(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay_ms,
            max_delay_ms: None,
        }
    }

    /// Exponential policy without a cap.
    pub fn exponential(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms,
            max_delay_ms: None,
        }
    }

    /// Cap every delay at `max_delay_ms`.
    pub fn with_cap(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    /// Check the descriptor is usable.
    pub fn validate(&self) -> AppResult<()> {
        if self.base_delay_ms == 0 {
            return Err(AppError::configuration(
                "Backoff base delay must be greater than zero",
            ));
        }
        if let Some(cap) = self.max_delay_ms {
            if cap < self.base_delay_ms {
                return Err(AppError::configuration(format!(
                    "Backoff cap {cap}ms is below the base delay {}ms",
                    self.base_delay_ms
                )));
            }
        }
        Ok(())
    }

    /// Delay in milliseconds before retrying after the given failed attempt.
    ///
    /// `attempt` is 1-indexed; 0 is treated as 1. Exponential delay is
    /// `base * 2^(attempt - 1)`, saturating, then capped.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let raw = match self.kind {
            BackoffKind::Fixed => self.base_delay_ms,
            BackoffKind::Exponential => {
                let shift = (attempt - 1).min(63);
                self.base_delay_ms.saturating_mul(1u64 << shift)
            }
        };

        match self.max_delay_ms {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }

    /// Same as [`delay_ms`](Self::delay_ms) as a `Duration`.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}
