use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::FamilyId;

pub const CONSENT_VERSION: &str = "1.0";

/// Latest consent a user gave for one family. Independent of access grants.
#[derive(Debug, Clone, FromRow)]
pub struct UserConsent {
    pub user_id: Uuid,
    pub family_id: FamilyId,
    pub marketing_consent: bool,
    pub terms_accepted: bool,
    pub consent_version: String,
    pub recorded_utc: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One row of a family's membership, joined with consent, for admin export and audit.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct FamilyMember {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub granted_utc: DateTime<Utc>,
    pub last_verified_utc: Option<DateTime<Utc>>,
    pub marketing_consent: Option<bool>,
    pub terms_accepted: Option<bool>,
}
