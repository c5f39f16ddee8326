use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{
    dtos::admin::{AdminSessionRequest, AdminSessionResponse, FamilyMembersResponse},
    middleware::{bearer_token, AdminUser, ClientContext, ADMIN_API_KEY_HEADER},
    services::{AuthError, ErrorBody},
    utils::ValidatedJson,
    AppState,
};

/// Open an admin session with the admin API key
#[utoipa::path(
    post,
    path = "/admin/sessions",
    request_body = AdminSessionRequest,
    responses(
        (status = 201, description = "Admin session opened", body = AdminSessionResponse),
        (status = 401, description = "Invalid or missing admin API key", body = ErrorBody)
    ),
    params(
        ("X-Admin-Api-Key" = String, Header, description = "Admin API key")
    ),
    tag = "Admin"
)]
pub async fn open_admin_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    client: ClientContext,
    ValidatedJson(req): ValidatedJson<AdminSessionRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let presented = headers
        .get(ADMIN_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let opened = state
        .admin
        .open_session(presented, &req.email, client.ip)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AdminSessionResponse {
            token: opened.token,
            admin_email: opened.admin_email,
            expires_at: opened.expires_at,
        }),
    ))
}

/// Revoke the calling admin session
#[utoipa::path(
    delete,
    path = "/admin/sessions",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Not an active admin session", body = ErrorBody)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn revoke_admin_session(
    State(state): State<AppState>,
    AdminUser(session): AdminUser,
    headers: HeaderMap,
) -> Result<StatusCode, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::Unauthenticated)?;
    if !state.admin.revoke(token).await? {
        return Err(AuthError::Unauthenticated);
    }
    tracing::info!(admin = %session.admin_email, "Admin signed out");
    Ok(StatusCode::NO_CONTENT)
}

/// Export the mailing list of consenting family members
#[utoipa::path(
    get,
    path = "/admin/families/{family}/emails.csv",
    params(("family" = String, Path, description = "Family identifier")),
    responses(
        (status = 200, description = "CSV of email,name,granted_at", content_type = "text/csv"),
        (status = 400, description = "Unknown family", body = ErrorBody),
        (status = 401, description = "Not an active admin session", body = ErrorBody)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn export_family_emails(
    State(state): State<AppState>,
    AdminUser(session): AdminUser,
    Path(family): Path<String>,
) -> Result<impl IntoResponse, AuthError> {
    let family = state.directory.resolve(&family)?;
    let csv = state.admin.export_emails_csv(&family).await?;

    tracing::info!(admin = %session.admin_email, family = %family, "Admin exported family email list");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}-emails.csv\"", family),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        csv,
    ))
}

/// Access audit for one family
#[utoipa::path(
    get,
    path = "/admin/families/{family}/members",
    params(("family" = String, Path, description = "Family identifier")),
    responses(
        (status = 200, description = "All members with grant and consent details", body = FamilyMembersResponse),
        (status = 400, description = "Unknown family", body = ErrorBody),
        (status = 401, description = "Not an active admin session", body = ErrorBody)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_family_members(
    State(state): State<AppState>,
    AdminUser(session): AdminUser,
    Path(family): Path<String>,
) -> Result<Json<FamilyMembersResponse>, AuthError> {
    let family = state.directory.resolve(&family)?;
    let members = state.admin.audit(&family).await?;

    tracing::info!(admin = %session.admin_email, family = %family, members = members.len(), "Admin viewed family members");

    Ok(Json(FamilyMembersResponse {
        family: family.to_string(),
        members,
    }))
}
