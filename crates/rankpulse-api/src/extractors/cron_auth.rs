//! Bearer-secret gate for scheduler-facing endpoints.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;

use crate::error::ApiError;
use crate::state::AppState;

/// Marker extracted when the request carries the configured cron secret.
///
/// Place it before any other extractor so the gate runs first.
#[derive(Debug, Clone, Copy)]
pub struct CronAuthorized;

/// Check an `Authorization` header value against the configured secret.
///
/// An unconfigured secret is a server fault and rejects every caller. The
/// scheme prefix is case-sensitive and the token must match exactly.
pub fn verify(authorization: Option<&str>, secret: Option<&str>) -> AppResult<()> {
    let Some(secret) = secret else {
        return Err(AppError::configuration("Cron secret is not configured"));
    };

    match authorization.and_then(|value| value.strip_prefix("Bearer ")) {
        Some(token) if token == secret => Ok(()),
        Some(_) => Err(AppError::unauthorized("Invalid cron credential")),
        None => Err(AppError::unauthorized("Missing cron credential")),
    }
}

impl FromRequestParts<AppState> for CronAuthorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        if let Err(e) = verify(header, state.config.cron.configured_secret()) {
            tracing::warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                reason = %e.message,
                "Cron request rejected"
            );
            return Err(e.into());
        }

        Ok(CronAuthorized)
    }
}
