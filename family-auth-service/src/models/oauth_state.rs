use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use super::FamilyId;

/// Server-side record of an issued OAuth `state`. Only the CSRF token hash is kept.
#[derive(Debug, Clone, FromRow)]
pub struct PendingAuthorization {
    pub csrf_hash: String,
    pub family_id: FamilyId,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(csrf_hash: String, family_id: FamilyId, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            csrf_hash,
            family_id,
            created_utc: now,
            expiry_utc: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }
}
