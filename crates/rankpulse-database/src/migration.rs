//! Database migration runner.

use sqlx::PgPool;

use rankpulse_core::error::{AppError, ErrorKind};
use rankpulse_core::result::AppResult;

/// Run all pending database migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    tracing::info!("Database migrations completed");
    Ok(())
}
