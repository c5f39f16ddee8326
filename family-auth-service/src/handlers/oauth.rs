//! Google sign-in entry points.
//!
//! `/oauth/start` binds the requested family into the OAuth `state`; the callback
//! checks it, signs the user in as pending and emails a verification code.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::{
    dtos::auth::{CallbackQuery, StartQuery},
    models::VerificationPurpose,
    services::{AuthError, ErrorBody},
    AppState,
};

/// 302 with a `Location` header.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Begin Google sign-in for a family
#[utoipa::path(
    get,
    path = "/oauth/start",
    params(StartQuery),
    responses(
        (status = 302, description = "Redirect to Google"),
        (status = 400, description = "Unknown family", body = ErrorBody),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "OAuth"
)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Response, AuthError> {
    let redirect = state.oauth.start_authorization(&query.family).await?;
    Ok(found(&redirect.url))
}

/// Google OAuth callback
#[utoipa::path(
    get,
    path = "/oauth/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Signed in, redirect to the family verify page"),
        (status = 400, description = "Malformed or replayed state", body = ErrorBody),
        (status = 403, description = "Google email not verified", body = ErrorBody),
        (status = 502, description = "Google exchange failed", body = ErrorBody),
        (status = 503, description = "Verification email could not be sent", body = ErrorBody)
    ),
    tag = "OAuth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AuthError> {
    if let Some(error) = query.error {
        tracing::info!(error = %error, "Google sign-in not completed");
        return Err(AuthError::InvalidRequest(format!(
            "Google sign-in was not completed: {}",
            error.chars().take(64).collect::<String>()
        )));
    }

    let raw_state = query.state.ok_or(AuthError::MalformedState)?;
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::InvalidRequest("Missing authorization code".to_string()))?;

    let completed = state.oauth.complete_authorization(&code, &raw_state).await?;

    let pending = state
        .sessions
        .issue_pending_at(&completed.user, Utc::now())?;
    let jar = jar.add(state.sessions.pending_cookie(&pending));

    // The pending cookie is kept on a failed send so the verify page can resend.
    if let Err(e) = state
        .verification
        .issue_challenge(
            completed.user.user_id,
            &completed.family,
            VerificationPurpose::FamilyAccess,
        )
        .await
    {
        return Ok((jar, e).into_response());
    }

    let verify_page = state
        .directory
        .profile(completed.family.as_str())
        .map(|p| format!("{}/verify", p.site_url))
        .ok_or_else(|| AuthError::InvalidFamily(completed.family.to_string()))?;

    Ok((jar, found(&verify_page)).into_response())
}
