//! Cron trigger configuration.

use serde::{Deserialize, Serialize};

/// Settings for externally triggered and in-process scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>`.
    #[serde(default)]
    pub secret: Option<String>,
    /// Lookback window used when the trigger does not name one.
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,
    /// Also run the GSC fan-out from an in-process schedule.
    #[serde(default)]
    pub schedule_enabled: bool,
    /// Six-field cron expression for the in-process GSC fan-out.
    #[serde(default = "default_gsc_sync_schedule")]
    pub gsc_sync_schedule: String,
}

impl CronConfig {
    /// The configured secret, ignoring blank values.
    pub fn configured_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            secret: None,
            default_window_days: default_window_days(),
            schedule_enabled: false,
            gsc_sync_schedule: default_gsc_sync_schedule(),
        }
    }
}

fn default_window_days() -> u32 {
    30
}

fn default_gsc_sync_schedule() -> String {
    "0 0 3 * * *".to_string()
}
