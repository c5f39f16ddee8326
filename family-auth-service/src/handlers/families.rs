use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    dtos::auth::{ConsentRequest, ConsentResponse, FamiliesResponse},
    middleware::{ClientContext, SessionUser},
    models::{UserConsent, CONSENT_VERSION},
    services::{AuthError, ErrorBody},
    utils::ValidatedJson,
    AppState,
};

/// Families served by this deployment
#[utoipa::path(
    get,
    path = "/families",
    responses(
        (status = 200, description = "Configured families", body = FamiliesResponse)
    ),
    tag = "Families"
)]
pub async fn list_families(State(state): State<AppState>) -> Json<FamiliesResponse> {
    Json(FamiliesResponse {
        families: state.directory.families().to_vec(),
    })
}

/// Record marketing and terms consent for a family
#[utoipa::path(
    post,
    path = "/consent/{family}",
    params(("family" = String, Path, description = "Family identifier")),
    request_body = ConsentRequest,
    responses(
        (status = 200, description = "Consent recorded", body = ConsentResponse),
        (status = 400, description = "Unknown family or no access", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "Families"
)]
pub async fn record_consent(
    State(state): State<AppState>,
    SessionUser(claims): SessionUser,
    client: ClientContext,
    Path(family): Path<String>,
    ValidatedJson(req): ValidatedJson<ConsentRequest>,
) -> Result<Json<ConsentResponse>, AuthError> {
    let family = state.directory.resolve(&family)?;
    let user_id = claims.user_id()?;

    if !state.store.has_family_access(user_id, &family).await? {
        return Err(AuthError::InvalidRequest(format!(
            "No access to family '{}'",
            family
        )));
    }

    let consent = UserConsent {
        user_id,
        family_id: family.clone(),
        marketing_consent: req.marketing_consent,
        terms_accepted: req.terms_accepted,
        consent_version: CONSENT_VERSION.to_string(),
        recorded_utc: Utc::now(),
        client_ip: client.ip,
        user_agent: client.user_agent,
    };
    state.store.record_consent(&consent).await?;

    tracing::info!(
        user_id = %user_id,
        family = %family,
        marketing = consent.marketing_consent,
        "Consent recorded"
    );

    Ok(Json(ConsentResponse {
        family: family.to_string(),
        consent_version: consent.consent_version,
        recorded_at: consent.recorded_utc,
    }))
}
