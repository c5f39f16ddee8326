use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use super::{AccessStore, SweepReport};
use crate::models::{
    AdminSession, ChallengeKey, FamilyAccess, FamilyId, FamilyMember, GrantSource,
    PendingAuthorization, ProviderIdentity, User, UserConsent, VerificationToken,
};
use crate::services::StoreError;

type UserFamily = (Uuid, FamilyId);

/// Process-local store for development and tests. Each invariant is held by the
/// `DashMap` shard lock of the tuple it concerns.
#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<Uuid, User>,
    subjects: DashMap<String, Uuid>,
    grants: DashMap<UserFamily, (u64, FamilyAccess)>,
    grant_seq: AtomicU64,
    consents: DashMap<UserFamily, UserConsent>,
    tokens: DashMap<ChallengeKey, VerificationToken>,
    superseded: DashMap<ChallengeKey, Vec<VerificationToken>>,
    pending: DashMap<String, PendingAuthorization>,
    admin_sessions: DashMap<String, AdminSession>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_grant(&self, user_id: Uuid, family_id: &FamilyId, now: DateTime<Utc>) -> bool {
        match self.grants.entry((user_id, family_id.clone())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let seq = self.grant_seq.fetch_add(1, Ordering::SeqCst);
                entry.insert((
                    seq,
                    FamilyAccess::new(user_id, family_id.clone(), GrantSource::EmailVerification, now),
                ));
                true
            }
        }
    }

    fn token_key(token: &VerificationToken) -> Result<ChallengeKey, StoreError> {
        token.key().ok_or_else(|| {
            StoreError::Integrity(format!("unknown purpose '{}'", token.purpose_code))
        })
    }
}

#[async_trait]
impl AccessStore for InMemoryStore {
    async fn upsert_user(
        &self,
        identity: &ProviderIdentity,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        match self.subjects.entry(identity.subject.clone()) {
            Entry::Occupied(entry) => {
                let user_id = *entry.get();
                let mut user = self.users.get_mut(&user_id).ok_or_else(|| {
                    StoreError::Integrity(format!("subject maps to missing user {}", user_id))
                })?;
                user.apply_identity(identity, now);
                Ok(user.clone())
            }
            Entry::Vacant(entry) => {
                let user = User::from_identity(identity, now);
                self.users.insert(user.user_id, user.clone());
                entry.insert(user.user_id);
                Ok(user)
            }
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn record_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.last_verified_utc = Some(now);
        }
        Ok(())
    }

    async fn grant_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.insert_grant(user_id, family_id, now))
    }

    async fn has_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
    ) -> Result<bool, StoreError> {
        Ok(self.grants.contains_key(&(user_id, family_id.clone())))
    }

    async fn list_user_families(&self, user_id: Uuid) -> Result<Vec<FamilyId>, StoreError> {
        let mut granted: Vec<(u64, FamilyId)> = self
            .grants
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| (entry.value().0, entry.key().1.clone()))
            .collect();
        granted.sort_by_key(|(seq, _)| *seq);
        Ok(granted.into_iter().map(|(_, family)| family).collect())
    }

    async fn record_consent(&self, consent: &UserConsent) -> Result<(), StoreError> {
        self.consents
            .insert((consent.user_id, consent.family_id.clone()), consent.clone());
        Ok(())
    }

    async fn list_family_members(
        &self,
        family_id: &FamilyId,
    ) -> Result<Vec<FamilyMember>, StoreError> {
        let grants: Vec<(u64, FamilyAccess)> = self
            .grants
            .iter()
            .filter(|entry| &entry.key().1 == family_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut members: Vec<(u64, FamilyMember)> = grants
            .into_iter()
            .filter_map(|(seq, grant)| {
                let user = self.users.get(&grant.user_id)?.clone();
                let consent = self
                    .consents
                    .get(&(grant.user_id, family_id.clone()))
                    .map(|c| c.clone());
                Some((
                    seq,
                    FamilyMember {
                        user_id: user.user_id,
                        email: user.email,
                        display_name: user.display_name,
                        granted_utc: grant.granted_utc,
                        last_verified_utc: user.last_verified_utc,
                        marketing_consent: consent.as_ref().map(|c| c.marketing_consent),
                        terms_accepted: consent.as_ref().map(|c| c.terms_accepted),
                    },
                ))
            })
            .collect();

        members.sort_by_key(|(seq, _)| *seq);
        Ok(members.into_iter().map(|(_, member)| member).collect())
    }

    async fn replace_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = Self::token_key(token)?;
        match self.tokens.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let mut previous = entry.insert(token.clone());
                if !previous.is_consumed() {
                    previous.supersede(now);
                    self.superseded.entry(key).or_default().push(previous);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(token.clone());
            }
        }
        Ok(())
    }

    async fn superseded_code_hashes(&self, key: &ChallengeKey) -> Result<Vec<String>, StoreError> {
        Ok(self
            .superseded
            .get(key)
            .map(|tokens| tokens.iter().map(|t| t.code_hash.clone()).collect())
            .unwrap_or_default())
    }

    async fn find_live_verification_token(
        &self,
        key: &ChallengeKey,
    ) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self
            .tokens
            .get(key)
            .filter(|t| !t.is_consumed())
            .map(|t| t.clone()))
    }

    async fn record_failed_attempt(
        &self,
        token: &VerificationToken,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let key = Self::token_key(token)?;
        let Some(mut stored) = self.tokens.get_mut(&key) else {
            return Ok(None);
        };
        if stored.token_id != token.token_id || stored.is_consumed() {
            return Ok(None);
        }

        stored.attempt_count += 1;
        let attempts = u32::try_from(stored.attempt_count).unwrap_or(u32::MAX);
        if attempts >= max_attempts {
            stored.consumed_utc = Some(now);
        }
        Ok(Some(attempts))
    }

    async fn redeem_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError> {
        let key = Self::token_key(token)?;
        let Some(mut stored) = self.tokens.get_mut(&key) else {
            return Ok(None);
        };
        if stored.token_id != token.token_id || stored.is_consumed() {
            return Ok(None);
        }
        stored.consumed_utc = Some(now);

        // Granted while the token shard is still held.
        Ok(Some(self.insert_grant(key.user_id, &key.family_id, now)))
    }

    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError> {
        self.pending
            .insert(pending.csrf_hash.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending_authorization(
        &self,
        csrf_hash: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        Ok(self.pending.remove(csrf_hash).map(|(_, pending)| pending))
    }

    async fn create_admin_session(&self, session: &AdminSession) -> Result<(), StoreError> {
        self.admin_sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_admin_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<AdminSession>, StoreError> {
        Ok(self.admin_sessions.get(token_hash).map(|s| s.clone()))
    }

    async fn touch_admin_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut session) = self
            .admin_sessions
            .iter_mut()
            .find(|entry| entry.value().session_id == session_id)
        {
            session.last_activity_utc = now;
        }
        Ok(())
    }

    async fn revoke_admin_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.admin_sessions.get_mut(token_hash) {
            Some(mut session) if session.revoked_utc.is_none() => {
                session.revoked_utc = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        token_retention: chrono::Duration,
    ) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        self.tokens.retain(|_, token| {
            let keep = token.expiry_utc + token_retention > now;
            if !keep {
                report.verification_tokens += 1;
            }
            keep
        });
        self.superseded.retain(|_, tokens| {
            let before = tokens.len();
            tokens.retain(|token| token.expiry_utc + token_retention > now);
            report.verification_tokens += (before - tokens.len()) as u64;
            !tokens.is_empty()
        });
        self.pending.retain(|_, pending| {
            let keep = !pending.is_expired_at(now);
            if !keep {
                report.pending_authorizations += 1;
            }
            keep
        });
        self.admin_sessions.retain(|_, session| {
            let keep = session.is_active_at(now);
            if !keep {
                report.admin_sessions += 1;
            }
            keep
        });

        Ok(report)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerificationPurpose;
    use chrono::Duration;

    fn identity(sub: &str, email: &str) -> ProviderIdentity {
        ProviderIdentity {
            subject: sub.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: Some("Ada".to_string()),
            picture: None,
        }
    }

    fn family(id: &str) -> FamilyId {
        FamilyId::new_unchecked(id)
    }

    #[tokio::test]
    async fn upsert_keeps_one_user_per_subject() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let first = store.upsert_user(&identity("g-1", "a@example.com"), now).await.unwrap();
        let second = store
            .upsert_user(&identity("g-1", "new@example.com"), now + Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(second.email, "new@example.com");
        assert_eq!(second.created_utc, now);
    }

    #[tokio::test]
    async fn grants_are_idempotent_and_ordered() {
        let store = InMemoryStore::new();
        let user = store.upsert_user(&identity("g-1", "a@example.com"), Utc::now()).await.unwrap();
        let now = Utc::now();

        assert!(store.grant_family_access(user.user_id, &family("north"), now).await.unwrap());
        assert!(store.grant_family_access(user.user_id, &family("bull"), now).await.unwrap());
        assert!(!store.grant_family_access(user.user_id, &family("north"), now).await.unwrap());

        let families = store.list_user_families(user.user_id).await.unwrap();
        assert_eq!(families, vec![family("north"), family("bull")]);
    }

    #[tokio::test]
    async fn burned_token_is_no_longer_live() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let key = ChallengeKey::new(Uuid::new_v4(), family("north"), VerificationPurpose::FamilyAccess);
        let token = VerificationToken::new(&key, "hash".to_string(), Duration::minutes(30), now);
        store.replace_verification_token(&token, now).await.unwrap();

        assert_eq!(store.record_failed_attempt(&token, 2, now).await.unwrap(), Some(1));
        assert_eq!(store.record_failed_attempt(&token, 2, now).await.unwrap(), Some(2));
        assert!(store.find_live_verification_token(&key).await.unwrap().is_none());
        assert_eq!(store.record_failed_attempt(&token, 2, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn replaced_token_is_kept_as_superseded() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let key = ChallengeKey::new(Uuid::new_v4(), family("north"), VerificationPurpose::FamilyAccess);
        let first = VerificationToken::new(&key, "first".to_string(), Duration::minutes(30), now);
        let second = VerificationToken::new(&key, "second".to_string(), Duration::minutes(30), now);

        store.replace_verification_token(&first, now).await.unwrap();
        store.replace_verification_token(&second, now).await.unwrap();

        let live = store.find_live_verification_token(&key).await.unwrap().unwrap();
        assert_eq!(live.token_id, second.token_id);
        assert_eq!(store.superseded_code_hashes(&key).await.unwrap(), vec!["first"]);
        assert_eq!(store.redeem_verification_token(&first, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn redeeming_grants_the_family_once() {
        let store = InMemoryStore::new();
        let user = store.upsert_user(&identity("g-1", "a@example.com"), Utc::now()).await.unwrap();
        let now = Utc::now();
        let key = ChallengeKey::new(user.user_id, family("north"), VerificationPurpose::FamilyAccess);
        let token = VerificationToken::new(&key, "hash".to_string(), Duration::minutes(30), now);
        store.replace_verification_token(&token, now).await.unwrap();

        assert_eq!(store.redeem_verification_token(&token, now).await.unwrap(), Some(true));
        assert_eq!(store.redeem_verification_token(&token, now).await.unwrap(), None);
        assert!(store.has_family_access(user.user_id, &family("north")).await.unwrap());
    }

    #[tokio::test]
    async fn pending_authorization_is_taken_once() {
        let store = InMemoryStore::new();
        let pending =
            PendingAuthorization::new("h".to_string(), family("north"), Duration::minutes(10), Utc::now());
        store.save_pending_authorization(&pending).await.unwrap();

        assert!(store.take_pending_authorization("h").await.unwrap().is_some());
        assert!(store.take_pending_authorization("h").await.unwrap().is_none());
    }
}
