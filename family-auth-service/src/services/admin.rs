//! Elevated admin sessions and per-family member reports.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::models::{AdminSession, FamilyId, FamilyMember};
use crate::services::{AccessStore, AuthError};
use crate::utils::{constant_time_eq, random_token, sha256_hex};

const ADMIN_TOKEN_BYTES: usize = 32;

/// An opened admin session. `token` is shown once and never stored.
#[derive(Debug, Clone)]
pub struct OpenedAdminSession {
    pub token: String,
    pub admin_email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn AccessStore>,
    api_key: SecretString,
    session_ttl: Duration,
}

impl AdminService {
    pub fn new(store: Arc<dyn AccessStore>, api_key: SecretString, session_ttl: Duration) -> Self {
        Self {
            store,
            api_key,
            session_ttl,
        }
    }

    pub fn api_key_matches(&self, presented: &str) -> bool {
        constant_time_eq(presented, self.api_key.expose_secret())
    }

    pub async fn open_session(
        &self,
        presented_key: &str,
        admin_email: &str,
        client_ip: Option<String>,
    ) -> Result<OpenedAdminSession, AuthError> {
        self.open_session_at(presented_key, admin_email, client_ip, Utc::now())
            .await
    }

    #[tracing::instrument(skip(self, presented_key, now))]
    pub async fn open_session_at(
        &self,
        presented_key: &str,
        admin_email: &str,
        client_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<OpenedAdminSession, AuthError> {
        if !self.api_key_matches(presented_key) {
            tracing::warn!(security_event = true, "Admin session refused: bad API key");
            metrics::counter!("security_events_total", "kind" => "admin_api_key").increment(1);
            return Err(AuthError::Unauthenticated);
        }

        let token = random_token(ADMIN_TOKEN_BYTES);
        let session = AdminSession::new(
            sha256_hex(&token),
            admin_email.to_string(),
            client_ip,
            self.session_ttl,
            now,
        );
        self.store.create_admin_session(&session).await?;

        tracing::info!(session_id = %session.session_id, "Admin session opened");
        Ok(OpenedAdminSession {
            token,
            admin_email: session.admin_email,
            expires_at: session.expiry_utc,
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<AdminSession, AuthError> {
        self.authenticate_at(token, Utc::now()).await
    }

    pub async fn authenticate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AdminSession, AuthError> {
        let session = self
            .store
            .find_admin_session(&sha256_hex(token))
            .await?
            .filter(|s| s.is_active_at(now))
            .ok_or(AuthError::Unauthenticated)?;

        self.store
            .touch_admin_session(session.session_id, now)
            .await?;
        Ok(session)
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        let revoked = self
            .store
            .revoke_admin_session(&sha256_hex(token), Utc::now())
            .await?;
        if revoked {
            tracing::info!("Admin session revoked");
        }
        Ok(revoked)
    }

    pub async fn audit(&self, family: &FamilyId) -> Result<Vec<FamilyMember>, AuthError> {
        Ok(self.store.list_family_members(family).await?)
    }

    /// `email,name,granted_at` rows for members who opted in to family mail.
    pub async fn export_emails_csv(&self, family: &FamilyId) -> Result<String, AuthError> {
        let members = self.store.list_family_members(family).await?;

        let mut csv = String::from("email,name,granted_at\n");
        let mut rows = 0usize;
        for member in members
            .iter()
            .filter(|m| m.marketing_consent == Some(true))
        {
            csv.push_str(&csv_field(&member.email));
            csv.push(',');
            csv.push_str(&csv_field(member.display_name.as_deref().unwrap_or("")));
            csv.push(',');
            csv.push_str(&member.granted_utc.to_rfc3339());
            csv.push('\n');
            rows += 1;
        }

        tracing::info!(family = %family, rows, "Email list exported");
        Ok(csv)
    }
}

/// Quote when needed and neutralise spreadsheet formula prefixes.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{}", value)
    } else {
        value.to_string()
    };

    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderIdentity, UserConsent, CONSENT_VERSION};
    use crate::services::InMemoryStore;

    fn service(store: Arc<InMemoryStore>) -> AdminService {
        AdminService::new(
            store,
            SecretString::new("admin-key".to_string()),
            Duration::minutes(60),
        )
    }

    #[test]
    fn csv_fields_are_escaped() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("Lovelace, Ada"), "\"Lovelace, Ada\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("=SUM(A1)"), "'=SUM(A1)");
    }

    #[tokio::test]
    async fn wrong_api_key_is_refused() {
        let admin = service(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            admin.open_session("nope", "ops@example.com", None).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn session_expires_and_revokes() {
        let admin = service(Arc::new(InMemoryStore::new()));
        let now = Utc::now();
        let opened = admin
            .open_session_at("admin-key", "ops@example.com", None, now)
            .await
            .unwrap();

        assert!(admin.authenticate_at(&opened.token, now).await.is_ok());
        assert!(admin
            .authenticate_at(&opened.token, now + Duration::minutes(61))
            .await
            .is_err());

        assert!(admin.revoke(&opened.token).await.unwrap());
        assert!(admin.authenticate_at(&opened.token, now).await.is_err());
    }

    #[tokio::test]
    async fn export_lists_only_consenting_members() {
        let store = Arc::new(InMemoryStore::new());
        let north = FamilyId::new_unchecked("north");
        let now = Utc::now();

        for (sub, email, consent) in [
            ("g-1", "yes@example.com", Some(true)),
            ("g-2", "no@example.com", Some(false)),
            ("g-3", "silent@example.com", None),
        ] {
            let user = store
                .upsert_user(
                    &ProviderIdentity {
                        subject: sub.to_string(),
                        email: email.to_string(),
                        email_verified: true,
                        name: Some("Member".to_string()),
                        picture: None,
                    },
                    now,
                )
                .await
                .unwrap();
            store.grant_family_access(user.user_id, &north, now).await.unwrap();
            if let Some(marketing) = consent {
                store
                    .record_consent(&UserConsent {
                        user_id: user.user_id,
                        family_id: north.clone(),
                        marketing_consent: marketing,
                        terms_accepted: true,
                        consent_version: CONSENT_VERSION.to_string(),
                        recorded_utc: now,
                        client_ip: None,
                        user_agent: None,
                    })
                    .await
                    .unwrap();
            }
        }

        let admin = service(store);
        let csv = admin.export_emails_csv(&north).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "email,name,granted_at");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("yes@example.com,Member,"));
        assert_eq!(admin.audit(&north).await.unwrap().len(), 3);
    }
}
