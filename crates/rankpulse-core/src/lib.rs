//! # rankpulse-core
//!
//! Core crate for RankPulse. Contains configuration schemas, the job,
//! site and backoff types shared by every queue, the broker and
//! repository traits, and the unified error system.
//!
//! This crate has **no** internal dependencies on other RankPulse crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
