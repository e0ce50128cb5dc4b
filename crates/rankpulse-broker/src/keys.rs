//! Broker key builders.
//!
//! Centralising key construction keeps the Redis layout in one place.

use uuid::Uuid;

/// Builds every key the broker touches under a common prefix.
#[derive(Debug, Clone)]
pub struct BrokerKeys {
    prefix: String,
}

impl BrokerKeys {
    /// Create a key builder. The prefix is used verbatim.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// JSON record of a job.
    pub fn job(&self, job_id: Uuid) -> String {
        format!("{}job:{job_id}", self.prefix)
    }

    // ── Per-queue sets ─────────────────────────────────────

    /// List of job ids ready to be claimed.
    pub fn wait(&self, queue: &str) -> String {
        format!("{}queue:{queue}:wait", self.prefix)
    }

    /// List of job ids currently claimed.
    pub fn active(&self, queue: &str) -> String {
        format!("{}queue:{queue}:active", self.prefix)
    }

    /// Sorted set of delayed job ids scored by ready-at epoch millis.
    pub fn delayed(&self, queue: &str) -> String {
        format!("{}queue:{queue}:delayed", self.prefix)
    }

    /// List of terminally failed job ids.
    pub fn failed(&self, queue: &str) -> String {
        format!("{}queue:{queue}:failed", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = BrokerKeys::new("rankpulse:");
        let id = Uuid::nil();
        assert_eq!(
            keys.job(id),
            "rankpulse:job:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys.wait("gsc-sync"), "rankpulse:queue:gsc-sync:wait");
        assert_eq!(keys.active("crawl"), "rankpulse:queue:crawl:active");
        assert_eq!(keys.delayed("score"), "rankpulse:queue:score:delayed");
        assert_eq!(keys.failed("performance"), "rankpulse:queue:performance:failed");
    }
}
