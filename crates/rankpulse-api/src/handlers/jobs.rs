//! Job trigger and statistics handlers.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Deserialize;
use validator::Validate;

use rankpulse_core::error::AppError;
use rankpulse_worker::fanout::FanOutSummary;

use crate::dto::response::JobStatsResponse;
use crate::error::ApiResult;
use crate::extractors::CronAuthorized;
use crate::state::AppState;

/// Query string of `POST /jobs/gsc-enqueue`.
#[derive(Debug, Deserialize, Validate)]
pub struct GscEnqueueQuery {
    /// Lookback window in days.
    #[validate(range(min = 1, max = 540, message = "days must be between 1 and 540"))]
    pub days: Option<u32>,
}

/// POST /jobs/gsc-enqueue?days=N
pub async fn gsc_enqueue(
    _auth: CronAuthorized,
    State(state): State<AppState>,
    query: Result<Query<GscEnqueueQuery>, QueryRejection>,
) -> ApiResult<Json<FanOutSummary>> {
    let Query(query) =
        query.map_err(|e| AppError::validation(format!("Invalid query: {}", e.body_text())))?;
    query
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let window_days = query
        .days
        .unwrap_or(state.config.cron.default_window_days);
    let summary = state
        .fanout
        .enqueue_daily_for_active_sites(window_days)
        .await?;

    Ok(Json(summary))
}

/// GET /jobs/stats
pub async fn stats(
    _auth: CronAuthorized,
    State(state): State<AppState>,
) -> ApiResult<Json<JobStatsResponse>> {
    let queues = state.queues.stats().await?;
    Ok(Json(JobStatsResponse { queues }))
}
