//! # rankpulse-api
//!
//! HTTP API layer for RankPulse built on Axum.
//!
//! Provides the cron trigger endpoints, the job statistics endpoint, the
//! health probe, the cron authorization extractor, request logging and
//! error mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
