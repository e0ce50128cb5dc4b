//! Application configuration schemas.
//!
//! Configuration is read from TOML files and the environment via the
//! `config` crate. Each sub-module represents a logical section.

pub mod app;
pub mod broker;
pub mod cron;
pub mod database;
pub mod logging;
pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::broker::BrokerConfig;
pub use self::cron::CronConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::queue::{QueueOptionsConfig, QueuesConfig};
pub use self::worker::WorkerConfig;

use crate::error::AppError;
use crate::types::job::{JobKind, validate_window};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Cron trigger settings.
    #[serde(default)]
    pub cron: CronConfig,
    /// Default job options per queue.
    #[serde(default)]
    pub queues: QueuesConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default`, the `config/{env}` overlay, variables
    /// prefixed with `RANKPULSE__`, and finally the plain `DATABASE_URL`,
    /// `REDIS_URL` and `CRON_SECRET` variables.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("RANKPULSE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("broker.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("cron.secret", std::env::var("CRON_SECRET").ok())?
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        for kind in JobKind::ALL {
            self.queues.options_for(kind)?;
        }
        validate_window(JobKind::GscSync, Some(self.cron.default_window_days)).map_err(|e| {
            AppError::configuration(format!("cron.default_window_days: {}", e.message))
        })?;
        if self.worker.stalled_after_seconds <= self.worker.job_timeout_seconds {
            return Err(AppError::configuration(
                "worker.stalled_after_seconds must exceed worker.job_timeout_seconds",
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(AppError::configuration(
                "worker.concurrency must be at least 1",
            ));
        }
        if self.worker.job_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "worker.job_timeout_seconds must be at least 1",
            ));
        }
        Ok(())
    }
}
