//! Site eligibility repository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use rankpulse_core::error::{AppError, ErrorKind};
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::repository::SiteRepository;
use rankpulse_core::types::site::EligibleSite;

/// Projection shared by every site query. A refresh token counts as valid
/// when it is present and not blank.
const SITE_PROJECTION: &str = "SELECT id AS site_id, organization_id, is_active, \
     (gsc_refresh_token IS NOT NULL AND btrim(gsc_refresh_token) <> '') AS has_valid_refresh_token \
     FROM sites";

#[derive(Debug, sqlx::FromRow)]
struct SiteRow {
    site_id: Uuid,
    organization_id: Uuid,
    is_active: bool,
    has_valid_refresh_token: bool,
}

impl From<SiteRow> for EligibleSite {
    fn from(row: SiteRow) -> Self {
        Self {
            site_id: row.site_id,
            organization_id: row.organization_id,
            is_active: row.is_active,
            has_valid_refresh_token: row.has_valid_refresh_token,
        }
    }
}

/// Reads site eligibility from the `sites` table.
#[derive(Debug, Clone)]
pub struct PgSiteRepository {
    pool: PgPool,
}

impl PgSiteRepository {
    /// Create a new site repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, filter: &str, context: &str) -> AppResult<Vec<EligibleSite>> {
        let sql = format!("{SITE_PROJECTION} WHERE {filter} ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, SiteRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, context.to_string(), e))?;
        Ok(rows.into_iter().map(EligibleSite::from).collect())
    }
}

#[async_trait]
impl SiteRepository for PgSiteRepository {
    async fn find_eligible_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.fetch(
            "is_active AND gsc_refresh_token IS NOT NULL AND btrim(gsc_refresh_token) <> ''",
            "Failed to list eligible sites",
        )
        .await
    }

    async fn find_active_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.fetch("is_active", "Failed to list active sites").await
    }

    async fn find_site(&self, site_id: Uuid) -> AppResult<Option<EligibleSite>> {
        let sql = format!("{SITE_PROJECTION} WHERE id = $1");
        sqlx::query_as::<_, SiteRow>(&sql)
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(EligibleSite::from))
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find site", e))
    }
}
