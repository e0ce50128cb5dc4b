//! Convenience result type alias for RankPulse.

use crate::error::AppError;

/// A specialized `Result` type for RankPulse operations.
pub type AppResult<T> = Result<T, AppError>;
