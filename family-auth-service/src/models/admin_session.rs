use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Elevated session for email export and access audit. Disjoint from user sessions.
#[derive(Debug, Clone, FromRow)]
pub struct AdminSession {
    pub session_id: Uuid,
    pub token_hash: String,
    pub admin_email: String,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub last_activity_utc: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl AdminSession {
    pub fn new(
        token_hash: String,
        admin_email: String,
        client_ip: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            token_hash,
            admin_email,
            created_utc: now,
            expiry_utc: now + ttl,
            last_activity_utc: now,
            client_ip,
            revoked_utc: None,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_utc.is_none() && now < self.expiry_utc
    }
}
