use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::{
    dtos::auth::{ChallengeResponse, MeResponse, ResendRequest, VerifyRequest},
    middleware::PendingUser,
    models::VerificationPurpose,
    services::{AuthError, ErrorBody, PENDING_COOKIE},
    utils::ValidatedJson,
    AppState,
};

/// Email a fresh verification code
#[utoipa::path(
    post,
    path = "/verify/resend",
    request_body = ResendRequest,
    responses(
        (status = 202, description = "Code sent", body = ChallengeResponse),
        (status = 400, description = "Unknown family", body = ErrorBody),
        (status = 401, description = "No pending sign-in", body = ErrorBody),
        (status = 503, description = "Email could not be sent", body = ErrorBody)
    ),
    tag = "Verification"
)]
pub async fn resend_code(
    State(state): State<AppState>,
    PendingUser(claims): PendingUser,
    ValidatedJson(req): ValidatedJson<ResendRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let family = state.directory.resolve(&req.family)?;
    let user_id = claims.user_id()?;

    let issued = state
        .verification
        .issue_challenge(user_id, &family, VerificationPurpose::FamilyAccess)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ChallengeResponse {
            family: issued.family.to_string(),
            message: "Verification code sent".to_string(),
            expires_at: issued.expires_at,
        }),
    ))
}

/// Submit the emailed code and receive a session
#[utoipa::path(
    post,
    path = "/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Family access granted, session cookie set", body = MeResponse),
        (status = 400, description = "Wrong code or unknown family", body = ErrorBody),
        (status = 401, description = "No pending sign-in", body = ErrorBody),
        (status = 409, description = "No active code", body = ErrorBody),
        (status = 410, description = "Code expired", body = ErrorBody)
    ),
    tag = "Verification"
)]
pub async fn verify_code(
    State(state): State<AppState>,
    PendingUser(claims): PendingUser,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let family = state.directory.resolve(&req.family)?;
    let user_id = claims.user_id()?;

    let now = Utc::now();
    let granted = state
        .verification
        .consume_challenge_at(user_id, &family, VerificationPurpose::FamilyAccess, &req.code, now)
        .await?;

    if granted {
        metrics::counter!("family_access_granted_total", "family" => family.to_string())
            .increment(1);
        tracing::info!(user_id = %user_id, family = %family, "Family access granted");
    }

    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;
    let families = state.store.list_user_families(user_id).await?;

    let issued = state.sessions.issue_at(&user, &families, now)?;
    let jar = jar
        .add(state.sessions.session_cookie(&issued))
        .add(state.sessions.removal_cookie(PENDING_COOKIE));

    Ok((
        jar,
        Json(MeResponse {
            id: user.user_id.to_string(),
            email: user.email,
            name: user.display_name,
            families: families.iter().map(|f| f.to_string()).collect(),
        }),
    ))
}
