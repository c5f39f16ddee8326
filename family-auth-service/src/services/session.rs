//! Signed session tokens and the cookies that carry them.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::models::{FamilyId, User};
use crate::services::AuthError;

pub const SESSION_COOKIE: &str = "family_session";
pub const PENDING_COOKIE: &str = "family_pending";

/// Distinguishes a full session from the short-lived token held between the OAuth
/// callback and code submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Session,
    PendingVerification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Granted families, oldest grant first
    #[serde(default)]
    pub families: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
    pub kind: TokenKind,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidSignature)
    }
}

/// A minted token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
    pending_ttl: Duration,
    cookie_domain: Option<String>,
}

impl SessionService {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            ttl: Duration::hours(config.ttl_hours),
            pending_ttl: Duration::minutes(config.pending_ttl_minutes),
            cookie_domain: config.cookie_domain.clone(),
        }
    }

    /// Convenience for tests and tools that only have a raw secret.
    pub fn from_secret(secret: &str, cookie_domain: Option<String>) -> Self {
        Self::new(&SessionConfig {
            secret: SecretString::new(secret.to_string()),
            cookie_domain,
            ttl_hours: 24,
            pending_ttl_minutes: 30,
            issuer: "family-genealogy-platform".to_string(),
        })
    }

    pub fn issue(&self, user: &User, families: &[FamilyId]) -> Result<IssuedToken, AuthError> {
        self.issue_at(user, families, Utc::now())
    }

    /// Mint a session embedding `families` as granted at `now`.
    pub fn issue_at(
        &self,
        user: &User,
        families: &[FamilyId],
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            families: families.iter().map(|f| f.as_str().to_string()).collect(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Session,
        };
        self.sign(&claims, expires_at)
    }

    /// Mint the token that carries a signed-in but unverified user to `/verify`.
    pub fn issue_pending_at(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let expires_at = now + self.pending_ttl;
        let claims = SessionClaims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            name: None,
            families: Vec::new(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::PendingVerification,
        };
        self.sign(&claims, expires_at)
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.validate_at(token, Utc::now())
    }

    /// Stateless check: signature, issuer, kind, then expiry against `now`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AuthError> {
        self.validate_kind_at(token, TokenKind::Session, now)
    }

    pub fn validate_pending_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, AuthError> {
        self.validate_kind_at(token, TokenKind::PendingVerification, now)
    }

    fn validate_kind_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below so that it stays distinct from a bad signature.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                AuthError::InvalidSignature
            })?
            .claims;

        if claims.kind != kind {
            return Err(AuthError::InvalidSignature);
        }

        if now.timestamp() >= claims.exp {
            return Err(AuthError::SessionExpired);
        }

        Ok(claims)
    }

    fn sign(&self, claims: &SessionClaims, expires_at: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Unavailable(format!("Failed to sign session: {}", e)))?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn session_cookie(&self, issued: &IssuedToken) -> Cookie<'static> {
        self.cookie(SESSION_COOKIE, issued.token.clone(), self.ttl)
    }

    pub fn pending_cookie(&self, issued: &IssuedToken) -> Cookie<'static> {
        self.cookie(PENDING_COOKIE, issued.token.clone(), self.pending_ttl)
    }

    /// An expired, empty cookie that makes the browser drop `name`.
    pub fn removal_cookie(&self, name: &'static str) -> Cookie<'static> {
        self.cookie(name, String::new(), Duration::zero())
    }

    fn cookie(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age.num_seconds()));

        if let Some(domain) = &self.cookie_domain {
            builder = builder.domain(domain.clone());
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn user() -> User {
        User {
            user_id: Uuid::new_v4(),
            google_sub: "g-1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: Some("Ada".to_string()),
            picture_url: None,
            created_utc: Utc::now(),
            last_login_utc: Utc::now(),
            last_verified_utc: None,
        }
    }

    #[test]
    fn round_trips_families_in_order() {
        let service = SessionService::from_secret(SECRET, None);
        let families = vec![
            FamilyId::new_unchecked("north"),
            FamilyId::new_unchecked("bull"),
        ];
        let now = Utc::now();
        let issued = service.issue_at(&user(), &families, now).unwrap();

        let claims = service.validate_at(&issued.token, now).unwrap();
        assert_eq!(claims.families, vec!["north", "bull"]);
        assert_eq!(issued.expires_at, now + Duration::hours(24));
    }

    #[test]
    fn expires_one_second_after_ttl() {
        let service = SessionService::from_secret(SECRET, None);
        let now = Utc::now();
        let issued = service.issue_at(&user(), &[], now).unwrap();

        let later = now + Duration::hours(24) + Duration::seconds(1);
        assert!(matches!(
            service.validate_at(&issued.token, later),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let issued = SessionService::from_secret("another-secret-another-secret-xx", None)
            .issue(&user(), &[])
            .unwrap();
        let service = SessionService::from_secret(SECRET, None);
        assert!(matches!(
            service.validate(&issued.token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_altered_token() {
        let service = SessionService::from_secret(SECRET, None);
        let issued = service.issue(&user(), &[]).unwrap();

        let mut bytes = issued.token.into_bytes();
        let idx = bytes.len() - 3;
        bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            service.validate(&tampered),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn pending_token_is_not_a_session() {
        let service = SessionService::from_secret(SECRET, None);
        let now = Utc::now();
        let pending = service.issue_pending_at(&user(), now).unwrap();

        assert!(matches!(
            service.validate_at(&pending.token, now),
            Err(AuthError::InvalidSignature)
        ));
        assert!(service.validate_pending_at(&pending.token, now).is_ok());
    }

    #[test]
    fn session_cookie_attributes() {
        let service = SessionService::from_secret(SECRET, Some(".family.example".to_string()));
        let issued = service.issue(&user(), &[]).unwrap();
        let header = service.session_cookie(&issued).to_string();

        assert!(header.starts_with("family_session="));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Max-Age=86400"));
        assert!(header.contains("Domain=family.example"));
        assert!(header.contains("Path=/"));
    }
}
