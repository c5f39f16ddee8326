use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::FamilyMember;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminSessionRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "archivist@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSessionResponse {
    /// Bearer token for the admin routes, shown once
    pub token: String,
    #[schema(example = "archivist@example.com")]
    pub admin_email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FamilyMembersResponse {
    #[schema(example = "north")]
    pub family: String,
    pub members: Vec<FamilyMember>,
}
