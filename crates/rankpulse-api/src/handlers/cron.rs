//! Scheduler-facing trigger handlers.

use axum::Json;
use axum::extract::State;

use rankpulse_worker::fanout::FanOutSummary;

use crate::error::ApiResult;
use crate::extractors::CronAuthorized;
use crate::state::AppState;

/// POST /cron/sync-gsc
///
/// Daily GSC fan-out over the configured default window.
pub async fn sync_gsc(
    _auth: CronAuthorized,
    State(state): State<AppState>,
) -> ApiResult<Json<FanOutSummary>> {
    let window_days = state.config.cron.default_window_days;
    let summary = state
        .fanout
        .enqueue_daily_for_active_sites(window_days)
        .await?;

    Ok(Json(summary))
}
