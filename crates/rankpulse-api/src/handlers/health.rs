//! Health check handler.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// Upper bound on the database round-trip.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /health
///
/// 200 with `ok` when the database answers, 503 with `degraded` otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db = match tokio::time::timeout(PROBE_TIMEOUT, state.health.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health probe failed");
            false
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = PROBE_TIMEOUT.as_millis() as u64,
                "Database health probe timed out"
            );
            false
        }
    };

    let (status, code) = if db {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            db,
            timestamp: Utc::now(),
        }),
    )
}
