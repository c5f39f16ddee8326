use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::auth::MeResponse,
    middleware::SessionUser,
    services::{AuthError, ErrorBody, PENDING_COOKIE, SESSION_COOKIE},
    AppState,
};

/// Current user and their families
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Signed in", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "Session"
)]
pub async fn me(SessionUser(claims): SessionUser) -> Result<Json<MeResponse>, AuthError> {
    Ok(Json(MeResponse {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
        families: claims.families,
    }))
}

/// Clear the session cookies
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Cookies cleared")
    ),
    tag = "Session"
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .add(state.sessions.removal_cookie(SESSION_COOKIE))
        .add(state.sessions.removal_cookie(PENDING_COOKIE));
    (StatusCode::NO_CONTENT, jar)
}
