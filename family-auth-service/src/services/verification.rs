//! Email verification challenges: one live six-digit code per (user, family, purpose).

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ChallengeKey, FamilyId, User, VerificationPurpose, VerificationToken};
use crate::services::{AccessStore, AuthError, EmailProvider, FamilyDirectory, VerificationEmail};
use crate::utils::{constant_time_eq, numeric_code, sha256_hex};

const CODE_DIGITS: u32 = 6;

/// An issued challenge, as reported to the caller. The code itself only travels by email.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub family: FamilyId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn AccessStore>,
    email: Arc<dyn EmailProvider>,
    directory: Arc<FamilyDirectory>,
    ttl: Duration,
    max_attempts: u32,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn AccessStore>,
        email: Arc<dyn EmailProvider>,
        directory: Arc<FamilyDirectory>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            email,
            directory,
            ttl,
            max_attempts,
        }
    }

    pub async fn issue_challenge(
        &self,
        user_id: Uuid,
        family: &FamilyId,
        purpose: VerificationPurpose,
    ) -> Result<IssuedChallenge, AuthError> {
        self.issue_challenge_at(user_id, family, purpose, Utc::now())
            .await
    }

    /// Replace any outstanding code for the tuple, then email the new one.
    #[tracing::instrument(skip(self, now), fields(family = %family))]
    pub async fn issue_challenge_at(
        &self,
        user_id: Uuid,
        family: &FamilyId,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<IssuedChallenge, AuthError> {
        let profile = self
            .directory
            .profile(family.as_str())
            .ok_or_else(|| AuthError::InvalidFamily(family.to_string()))?;

        let user: User = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let code = numeric_code(CODE_DIGITS);
        let key = ChallengeKey::new(user_id, family.clone(), purpose);
        let token = VerificationToken::new(&key, sha256_hex(&code), self.ttl, now);
        self.store.replace_verification_token(&token, now).await?;

        let message = VerificationEmail {
            to: user.email,
            family: profile.clone(),
            code,
            verify_link: format!("{}/verify", profile.site_url),
            expires_minutes: self.ttl.num_minutes(),
        };
        self.email.send_family_verification(&message).await?;

        metrics::counter!("verification_challenges_issued_total", "family" => family.to_string())
            .increment(1);
        tracing::info!(user_id = %user_id, "Verification code issued");

        Ok(IssuedChallenge {
            family: family.clone(),
            expires_at: token.expiry_utc,
        })
    }

    pub async fn consume_challenge(
        &self,
        user_id: Uuid,
        family: &FamilyId,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<bool, AuthError> {
        self.consume_challenge_at(user_id, family, purpose, code, Utc::now())
            .await
    }

    /// Accept the code at most once and grant the family with it. Returns whether the
    /// grant is new. Expired, burned and superseded codes never grant anything.
    #[tracing::instrument(skip(self, code, now), fields(family = %family))]
    pub async fn consume_challenge_at(
        &self,
        user_id: Uuid,
        family: &FamilyId,
        purpose: VerificationPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let key = ChallengeKey::new(user_id, family.clone(), purpose);
        let token = self
            .store
            .find_live_verification_token(&key)
            .await?
            .ok_or(AuthError::NoActiveChallenge)?;

        if token.is_expired_at(now) {
            return Err(AuthError::ChallengeExpired);
        }

        let submitted = sha256_hex(code.trim());
        if !constant_time_eq(&submitted, &token.code_hash) {
            // A code from a replaced challenge is dead, not a guess at the live one.
            let superseded = self.store.superseded_code_hashes(&key).await?;
            if superseded
                .iter()
                .any(|hash| constant_time_eq(&submitted, hash))
            {
                metrics::counter!("verification_failures_total", "reason" => "superseded")
                    .increment(1);
                tracing::info!(user_id = %user_id, "Superseded verification code submitted");
                return Err(AuthError::NoActiveChallenge);
            }

            let attempts = self
                .store
                .record_failed_attempt(&token, self.max_attempts, now)
                .await?;
            metrics::counter!("verification_failures_total", "reason" => "code_mismatch")
                .increment(1);

            return match attempts {
                Some(n) if n >= self.max_attempts => {
                    tracing::warn!(user_id = %user_id, attempts = n, "Verification code burned after repeated mismatches");
                    Err(AuthError::CodeMismatch)
                }
                Some(_) => Err(AuthError::CodeMismatch),
                None => Err(AuthError::NoActiveChallenge),
            };
        }

        let granted = self
            .store
            .redeem_verification_token(&token, now)
            .await?
            .ok_or(AuthError::NoActiveChallenge)?;

        // Best effort: access is already granted.
        if let Err(e) = self.store.record_verified(user_id, now).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record verification time");
        }

        tracing::info!(user_id = %user_id, new_grant = granted, "Verification code accepted");
        Ok(granted)
    }
}
