//! Access-control store: users, family grants, consent and short-lived auth records.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AdminSession, ChallengeKey, FamilyId, FamilyMember, PendingAuthorization, ProviderIdentity,
    User, UserConsent, VerificationToken,
};
use crate::services::StoreError;

/// Rows removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub verification_tokens: u64,
    pub pending_authorizations: u64,
    pub admin_sessions: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.verification_tokens + self.pending_authorizations + self.admin_sessions
    }
}

/// Persistence boundary. Every mutation that guards an invariant is atomic for its
/// own tuple; unrelated users and families never contend.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Create or refresh the user for a provider subject.
    async fn upsert_user(
        &self,
        identity: &ProviderIdentity,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn record_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Idempotent. Returns `true` only when a new grant was written.
    async fn grant_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn has_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
    ) -> Result<bool, StoreError>;

    /// Families granted to the user, oldest grant first.
    async fn list_user_families(&self, user_id: Uuid) -> Result<Vec<FamilyId>, StoreError>;

    /// Latest record per (user, family) wins.
    async fn record_consent(&self, consent: &UserConsent) -> Result<(), StoreError>;

    /// Members of a family with their consent, oldest grant first.
    async fn list_family_members(
        &self,
        family_id: &FamilyId,
    ) -> Result<Vec<FamilyMember>, StoreError>;

    /// Supersede any outstanding token for the tuple and store `token` as the live one.
    async fn replace_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// The unconsumed token for the tuple, expired or not.
    async fn find_live_verification_token(
        &self,
        key: &ChallengeKey,
    ) -> Result<Option<VerificationToken>, StoreError>;

    /// Count a wrong guess; the token is burned once `max_attempts` is reached.
    /// Returns the new attempt count, or `None` if the token was no longer live.
    async fn record_failed_attempt(
        &self,
        token: &VerificationToken,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError>;

    /// Code hashes of tokens for the tuple that a newer challenge replaced.
    async fn superseded_code_hashes(&self, key: &ChallengeKey) -> Result<Vec<String>, StoreError>;

    /// Mark the token consumed and grant its family in one step. Exactly one caller
    /// ever observes `Some` for a token; the flag says whether the grant is new.
    async fn redeem_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError>;

    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError>;

    /// Remove and return the record. A second take of the same hash yields `None`.
    async fn take_pending_authorization(
        &self,
        csrf_hash: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError>;

    async fn create_admin_session(&self, session: &AdminSession) -> Result<(), StoreError>;

    async fn find_admin_session(&self, token_hash: &str)
        -> Result<Option<AdminSession>, StoreError>;

    async fn touch_admin_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn revoke_admin_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Delete expired short-lived records. Verification tokens are kept for
    /// `token_retention` past expiry so late submissions still report expiry.
    async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        token_retention: chrono::Duration,
    ) -> Result<SweepReport, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
