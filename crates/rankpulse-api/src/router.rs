//! Route definitions for the HTTP surface.

use std::time::Duration;

use axum::Router;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    Router::new()
        .merge(health_routes())
        .merge(cron_routes())
        .merge(job_routes())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

fn cron_routes() -> Router<AppState> {
    Router::new().route("/cron/sync-gsc", post(handlers::cron::sync_gsc))
}

fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/gsc-enqueue", post(handlers::jobs::gsc_enqueue))
        .route("/jobs/stats", get(handlers::jobs::stats))
}
