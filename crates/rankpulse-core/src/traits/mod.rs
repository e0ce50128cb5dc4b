//! Core traits defined in `rankpulse-core` and implemented by other crates.

pub mod broker;
pub mod health;
pub mod repository;

pub use broker::JobBroker;
pub use health::HealthProbe;
pub use repository::{SiteRepository, SyncRunRepository};
