use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::FamilyId;

/// What a verification code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationPurpose {
    FamilyAccess,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::FamilyAccess => "family_access",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "family_access" => Some(VerificationPurpose::FamilyAccess),
            _ => None,
        }
    }
}

/// The tuple that at most one live code may exist for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeKey {
    pub user_id: Uuid,
    pub family_id: FamilyId,
    pub purpose: VerificationPurpose,
}

impl ChallengeKey {
    pub fn new(user_id: Uuid, family_id: FamilyId, purpose: VerificationPurpose) -> Self {
        Self {
            user_id,
            family_id,
            purpose,
        }
    }

    /// Stable string form, used as the advisory lock key.
    pub fn lock_key(&self) -> String {
        format!(
            "verification:{}:{}:{}",
            self.user_id,
            self.family_id,
            self.purpose.as_str()
        )
    }
}

/// A hashed one-time code. Consumed at most once, dead after `expiry_utc`.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub family_id: FamilyId,
    pub purpose_code: String,
    pub code_hash: String,
    pub attempt_count: i32,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub consumed_utc: Option<DateTime<Utc>>,
    /// Set when a newer code for the same tuple replaced this one.
    pub superseded_utc: Option<DateTime<Utc>>,
}

impl VerificationToken {
    pub fn new(key: &ChallengeKey, code_hash: String, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            user_id: key.user_id,
            family_id: key.family_id.clone(),
            purpose_code: key.purpose.as_str().to_string(),
            code_hash,
            attempt_count: 0,
            created_utc: now,
            expiry_utc: now + ttl,
            consumed_utc: None,
            superseded_utc: None,
        }
    }

    pub fn key(&self) -> Option<ChallengeKey> {
        VerificationPurpose::parse(&self.purpose_code)
            .map(|purpose| ChallengeKey::new(self.user_id, self.family_id.clone(), purpose))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_utc.is_some()
    }

    /// Retire an outstanding code in favour of a newer one.
    pub fn supersede(&mut self, now: DateTime<Utc>) {
        self.consumed_utc = Some(now);
        self.superseded_utc = Some(now);
    }
}
