//! Site projection used by fan-out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobKind;

/// The slice of a tenant's site that scheduling cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleSite {
    /// Site identifier.
    pub site_id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Whether the site is switched on.
    pub is_active: bool,
    /// Whether a usable search-console refresh token is stored.
    pub has_valid_refresh_token: bool,
}

impl EligibleSite {
    /// GSC-type eligibility: active and holding a valid refresh token.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.has_valid_refresh_token
    }

    /// Eligibility for a specific job kind.
    pub fn is_eligible_for(&self, kind: JobKind) -> bool {
        if kind.requires_search_console() {
            self.is_eligible()
        } else {
            self.is_active
        }
    }
}
