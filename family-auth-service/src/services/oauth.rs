//! Google OAuth 2.0 authorization-code flow with family-bound CSRF state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::GoogleOAuthConfig;
use crate::models::{FamilyId, PendingAuthorization, ProviderIdentity, User};
use crate::services::{AccessStore, AuthError, FamilyDirectory};
use crate::utils::{random_token, sha256_hex};

const STATE_SEPARATOR: char = ':';
const CSRF_TOKEN_BYTES: usize = 32;
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// The OAuth `state` value: `"<familyId>:<csrfToken>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    pub family: FamilyId,
    pub csrf: String,
}

impl AuthorizationState {
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.family, STATE_SEPARATOR, self.csrf)
    }

    /// Split on the first separator and check the family against the directory.
    pub fn parse(raw: &str, directory: &FamilyDirectory) -> Result<Self, AuthError> {
        let (family, csrf) = raw
            .split_once(STATE_SEPARATOR)
            .ok_or(AuthError::MalformedState)?;

        if family.is_empty() || csrf.is_empty() || !FamilyId::is_well_formed(family) {
            return Err(AuthError::MalformedState);
        }

        let family = directory
            .resolve(family)
            .map_err(|_| AuthError::MalformedState)?;

        Ok(Self {
            family,
            csrf: csrf.to_string(),
        })
    }
}

/// External identity provider seam.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, AuthError>;
}

/// Response from Google token endpoint.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    id_token: Option<String>,
}

/// Google ID token claims.
#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.eq_ignore_ascii_case("true"),
    })
}

pub struct GoogleProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    auth_endpoint: String,
    token_endpoint: String,
}

impl GoogleProvider {
    pub fn new(config: &GoogleOAuthConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_endpoint: config.auth_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
        })
    }

    /// The ID token arrives straight from Google's token endpoint over TLS, so its
    /// signature is not re-checked; audience, issuer and expiry still are.
    fn decode_id_token(&self, id_token: &str) -> Result<GoogleIdTokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        decode::<GoogleIdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("Invalid ID token: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            self.auth_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    #[tracing::instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, AuthError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "unreachable" };
                tracing::warn!(error = %e, reason, "Google token exchange failed");
                AuthError::ProviderExchangeFailed(format!("Token endpoint {}", reason))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Google token endpoint rejected the code");
            return Err(AuthError::ProviderExchangeFailed(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let tokens = response.json::<GoogleTokenResponse>().await.map_err(|e| {
            AuthError::ProviderExchangeFailed(format!("Failed to parse token response: {}", e))
        })?;

        let id_token = tokens.id_token.ok_or_else(|| {
            AuthError::ProviderExchangeFailed("No ID token in response".to_string())
        })?;

        let claims = self.decode_id_token(&id_token)?;
        let email = claims.email.ok_or_else(|| {
            AuthError::ProviderExchangeFailed("Email not provided by Google".to_string())
        })?;

        Ok(ProviderIdentity {
            subject: claims.sub,
            email,
            email_verified: claims.email_verified,
            name: claims.name,
            picture: claims.picture,
        })
    }
}

/// Result of a start request: where to send the browser.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: String,
    pub state: AuthorizationState,
}

/// Result of a successful callback. No family access is implied.
#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    pub user: User,
    pub family: FamilyId,
}

#[derive(Clone)]
pub struct OAuthCoordinator {
    store: Arc<dyn AccessStore>,
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<FamilyDirectory>,
    state_ttl: Duration,
}

impl OAuthCoordinator {
    pub fn new(
        store: Arc<dyn AccessStore>,
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<FamilyDirectory>,
        state_ttl: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            directory,
            state_ttl,
        }
    }

    pub async fn start_authorization(&self, family: &str) -> Result<AuthorizationRedirect, AuthError> {
        self.start_authorization_at(family, Utc::now()).await
    }

    #[tracing::instrument(skip(self, now))]
    pub async fn start_authorization_at(
        &self,
        family: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationRedirect, AuthError> {
        let family = self.directory.resolve(family)?;
        let csrf = random_token(CSRF_TOKEN_BYTES);

        let pending =
            PendingAuthorization::new(sha256_hex(&csrf), family.clone(), self.state_ttl, now);
        self.store.save_pending_authorization(&pending).await?;

        let state = AuthorizationState { family, csrf };
        let url = self.provider.authorization_url(&state.encode());

        tracing::info!(family = %state.family, "Authorization started");
        Ok(AuthorizationRedirect { url, state })
    }

    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CompletedAuthorization, AuthError> {
        self.complete_authorization_at(code, state, Utc::now()).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn complete_authorization_at(
        &self,
        code: &str,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletedAuthorization, AuthError> {
        let state = AuthorizationState::parse(state, &self.directory)?;

        let pending = self
            .store
            .take_pending_authorization(&sha256_hex(&state.csrf))
            .await?
            .ok_or(AuthError::CsrfMismatch)?;

        if pending.is_expired_at(now) || pending.family_id != state.family {
            return Err(AuthError::CsrfMismatch);
        }

        let identity = self.provider.exchange_code(code).await?;
        if !identity.email_verified {
            return Err(AuthError::ProviderEmailUnverified);
        }

        let user = self.store.upsert_user(&identity, now).await?;

        tracing::info!(user_id = %user.user_id, family = %state.family, "Authorization completed");
        Ok(CompletedAuthorization {
            user,
            family: state.family,
        })
    }
}
