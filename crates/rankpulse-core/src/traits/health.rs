//! Liveness probe trait.

use async_trait::async_trait;

use crate::result::AppResult;

/// Something that can answer a trivial round-trip query.
#[async_trait]
pub trait HealthProbe: Send + Sync + std::fmt::Debug + 'static {
    /// Run the round-trip. Any error means unreachable.
    async fn ping(&self) -> AppResult<()>;
}
