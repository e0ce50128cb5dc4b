//! Custom Axum extractors.

pub mod cron_auth;

pub use cron_auth::CronAuthorized;
