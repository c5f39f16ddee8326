use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::{
    services::{AuthError, SessionClaims, PENDING_COOKIE, SESSION_COOKIE},
    AppState,
};

/// A request carrying a valid `family_session` cookie.
pub struct SessionUser(pub SessionClaims);

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let claims = state.sessions.validate_at(&token, Utc::now())?;
        Ok(SessionUser(claims))
    }
}

/// A signed-in user between the OAuth callback and code submission.
pub struct PendingUser(pub SessionClaims);

#[axum::async_trait]
impl FromRequestParts<AppState> for PendingUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(PENDING_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let claims = state.sessions.validate_pending_at(&token, Utc::now())?;
        Ok(PendingUser(claims))
    }
}

/// Caller address and user agent, recorded with consent and admin sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = service_core::middleware::rate_limit::client_ip(&parts.headers, &parts.extensions)
            .map(|ip| ip.to_string());
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(512).collect());

        Ok(ClientContext { ip, user_agent })
    }
}
