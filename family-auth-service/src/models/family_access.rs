use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::FamilyId;

/// How a family grant came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantSource {
    EmailVerification,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSource::EmailVerification => "email_verification",
        }
    }
}

/// Permission for one user to view one family's archive. Never expires.
#[derive(Debug, Clone, FromRow)]
pub struct FamilyAccess {
    pub user_id: Uuid,
    pub family_id: FamilyId,
    pub granted_utc: DateTime<Utc>,
    pub granted_by_code: String,
}

impl FamilyAccess {
    pub fn new(user_id: Uuid, family_id: FamilyId, source: GrantSource, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            family_id,
            granted_utc: now,
            granted_by_code: source.as_str().to_string(),
        }
    }
}
