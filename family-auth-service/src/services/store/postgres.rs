use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccessStore, SweepReport};
use crate::models::{
    AdminSession, ChallengeKey, FamilyId, FamilyMember, GrantSource, PendingAuthorization,
    ProviderIdentity, User, UserConsent, VerificationToken,
};
use crate::services::StoreError;

const USER_COLUMNS: &str = "user_id, google_sub, email, display_name, picture_url, \
                            created_utc, last_login_utc, last_verified_utc";

/// PostgreSQL-backed store.
///
/// Challenge replacement serializes on a transaction-scoped advisory lock keyed by
/// (user, family, purpose), backed by a partial unique index on live tokens. Single-use
/// records are consumed with conditional `UPDATE` or `DELETE ... RETURNING`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::db::run_migrations(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AccessStore for PostgresStore {
    async fn upsert_user(
        &self,
        identity: &ProviderIdentity,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (user_id, google_sub, email, display_name, picture_url, created_utc, last_login_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (google_sub) DO UPDATE
            SET email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                picture_url = EXCLUDED.picture_url,
                last_login_utc = EXCLUDED.last_login_utc
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&identity.subject)
            .bind(&identity.email)
            .bind(&identity.name)
            .bind(&identity.picture)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn record_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_verified_utc = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn grant_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO family_access (user_id, family_id, granted_utc, granted_by_code)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, family_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(family_id)
        .bind(now)
        .bind(GrantSource::EmailVerification.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_family_access(
        &self,
        user_id: Uuid,
        family_id: &FamilyId,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM family_access WHERE user_id = $1 AND family_id = $2)",
        )
        .bind(user_id)
        .bind(family_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_user_families(&self, user_id: Uuid) -> Result<Vec<FamilyId>, StoreError> {
        let families = sqlx::query_scalar::<_, FamilyId>(
            "SELECT family_id FROM family_access WHERE user_id = $1 ORDER BY grant_seq",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(families)
    }

    async fn record_consent(&self, consent: &UserConsent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_consents
                (user_id, family_id, marketing_consent, terms_accepted, consent_version, recorded_utc, client_ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, family_id) DO UPDATE
            SET marketing_consent = EXCLUDED.marketing_consent,
                terms_accepted = EXCLUDED.terms_accepted,
                consent_version = EXCLUDED.consent_version,
                recorded_utc = EXCLUDED.recorded_utc,
                client_ip = EXCLUDED.client_ip,
                user_agent = EXCLUDED.user_agent
            "#,
        )
        .bind(consent.user_id)
        .bind(&consent.family_id)
        .bind(consent.marketing_consent)
        .bind(consent.terms_accepted)
        .bind(&consent.consent_version)
        .bind(consent.recorded_utc)
        .bind(&consent.client_ip)
        .bind(&consent.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_family_members(
        &self,
        family_id: &FamilyId,
    ) -> Result<Vec<FamilyMember>, StoreError> {
        let members = sqlx::query_as::<_, FamilyMember>(
            r#"
            SELECT u.user_id, u.email, u.display_name, fa.granted_utc, u.last_verified_utc,
                   c.marketing_consent, c.terms_accepted
            FROM family_access fa
            JOIN users u ON u.user_id = fa.user_id
            LEFT JOIN user_consents c ON c.user_id = fa.user_id AND c.family_id = fa.family_id
            WHERE fa.family_id = $1
            ORDER BY fa.grant_seq
            "#,
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn replace_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = token.key().ok_or_else(|| {
            StoreError::Integrity(format!("unknown purpose '{}'", token.purpose_code))
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.lock_key())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE email_verification_tokens
            SET consumed_utc = $4, superseded_utc = $4
            WHERE user_id = $1 AND family_id = $2 AND purpose_code = $3 AND consumed_utc IS NULL
            "#,
        )
        .bind(token.user_id)
        .bind(&token.family_id)
        .bind(&token.purpose_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO email_verification_tokens
                (token_id, user_id, family_id, purpose_code, code_hash, attempt_count, created_utc, expiry_utc)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.family_id)
        .bind(&token.purpose_code)
        .bind(&token.code_hash)
        .bind(token.created_utc)
        .bind(token.expiry_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_live_verification_token(
        &self,
        key: &ChallengeKey,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT token_id, user_id, family_id, purpose_code, code_hash, attempt_count,
                   created_utc, expiry_utc, consumed_utc, superseded_utc
            FROM email_verification_tokens
            WHERE user_id = $1 AND family_id = $2 AND purpose_code = $3 AND consumed_utc IS NULL
            "#,
        )
        .bind(key.user_id)
        .bind(&key.family_id)
        .bind(key.purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn record_failed_attempt(
        &self,
        token: &VerificationToken,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE email_verification_tokens
            SET attempt_count = attempt_count + 1,
                consumed_utc = CASE WHEN attempt_count + 1 >= $2 THEN $3 ELSE NULL END
            WHERE token_id = $1 AND consumed_utc IS NULL
            RETURNING attempt_count
            "#,
        )
        .bind(token.token_id)
        .bind(max_attempts)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.map(|n| u32::try_from(n).unwrap_or(0)))
    }

    async fn superseded_code_hashes(&self, key: &ChallengeKey) -> Result<Vec<String>, StoreError> {
        let hashes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT code_hash
            FROM email_verification_tokens
            WHERE user_id = $1 AND family_id = $2 AND purpose_code = $3
              AND superseded_utc IS NOT NULL
            "#,
        )
        .bind(key.user_id)
        .bind(&key.family_id)
        .bind(key.purpose.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(hashes)
    }

    async fn redeem_verification_token(
        &self,
        token: &VerificationToken,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query_as::<_, (Uuid, FamilyId)>(
            r#"
            UPDATE email_verification_tokens
            SET consumed_utc = $2
            WHERE token_id = $1 AND consumed_utc IS NULL
            RETURNING user_id, family_id
            "#,
        )
        .bind(token.token_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, family_id)) = consumed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let granted = sqlx::query(
            r#"
            INSERT INTO family_access (user_id, family_id, granted_utc, granted_by_code)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, family_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&family_id)
        .bind(now)
        .bind(GrantSource::EmailVerification.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(granted.rows_affected() == 1))
    }

    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_authorizations (csrf_hash, family_id, created_utc, expiry_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&pending.csrf_hash)
        .bind(&pending.family_id)
        .bind(pending.created_utc)
        .bind(pending.expiry_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_pending_authorization(
        &self,
        csrf_hash: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        let pending = sqlx::query_as::<_, PendingAuthorization>(
            r#"
            DELETE FROM pending_authorizations
            WHERE csrf_hash = $1
            RETURNING csrf_hash, family_id, created_utc, expiry_utc
            "#,
        )
        .bind(csrf_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn create_admin_session(&self, session: &AdminSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO admin_sessions
                (session_id, token_hash, admin_email, created_utc, expiry_utc, last_activity_utc, client_ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(&session.token_hash)
        .bind(&session.admin_email)
        .bind(session.created_utc)
        .bind(session.expiry_utc)
        .bind(session.last_activity_utc)
        .bind(&session.client_ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_admin_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<AdminSession>, StoreError> {
        let session = sqlx::query_as::<_, AdminSession>(
            r#"
            SELECT session_id, token_hash, admin_email, created_utc, expiry_utc,
                   last_activity_utc, client_ip, revoked_utc
            FROM admin_sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn touch_admin_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE admin_sessions SET last_activity_utc = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_admin_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE admin_sessions SET revoked_utc = $2 WHERE token_hash = $1 AND revoked_utc IS NULL",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        token_retention: chrono::Duration,
    ) -> Result<SweepReport, StoreError> {
        let tokens = sqlx::query("DELETE FROM email_verification_tokens WHERE expiry_utc < $1")
            .bind(now - token_retention)
            .execute(&self.pool)
            .await?;

        let pending = sqlx::query("DELETE FROM pending_authorizations WHERE expiry_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let admin = sqlx::query(
            "DELETE FROM admin_sessions WHERE expiry_utc <= $1 OR revoked_utc IS NOT NULL",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SweepReport {
            verification_tokens: tokens.rows_affected(),
            pending_authorizations: pending.rows_affected(),
            admin_sessions: admin.rows_affected(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::db::health_check(&self.pool).await?;
        Ok(())
    }
}
