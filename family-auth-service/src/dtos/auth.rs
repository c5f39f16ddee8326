use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::FamilyProfile;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StartQuery {
    /// Family the user wants to join
    #[param(example = "north")]
    pub family: String,
}

/// Query params from the Google callback.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResendRequest {
    #[validate(length(min = 1, max = 64, message = "Family is required"))]
    #[schema(example = "north")]
    pub family: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    #[schema(example = "north")]
    pub family: String,
    #[schema(example = "Verification code sent")]
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyRequest {
    #[validate(length(min = 1, max = 64, message = "Family is required"))]
    #[schema(example = "north")]
    pub family: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    #[schema(example = "042917", min_length = 6, max_length = 6)]
    pub code: String,
}

/// The signed-in user as seen by family sites.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Ada Lovelace")]
    pub name: Option<String>,
    #[schema(example = json!(["north", "bull"]))]
    pub families: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FamiliesResponse {
    pub families: Vec<FamilyProfile>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConsentRequest {
    #[schema(example = true)]
    pub marketing_consent: bool,
    #[schema(example = true)]
    pub terms_accepted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentResponse {
    #[schema(example = "north")]
    pub family: String,
    #[schema(example = "1.0")]
    pub consent_version: String,
    pub recorded_at: DateTime<Utc>,
}
