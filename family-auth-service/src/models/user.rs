//! User model - one row per Google account.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// User entity, keyed internally by `user_id` and externally by the Google subject.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct User {
    pub user_id: Uuid,
    #[serde(skip)]
    pub google_sub: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub last_login_utc: DateTime<Utc>,
    pub last_verified_utc: Option<DateTime<Utc>>,
}

/// Identity asserted by the provider after a successful code exchange.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl User {
    /// First sighting of a provider identity.
    pub fn from_identity(identity: &ProviderIdentity, now: DateTime<Utc>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            google_sub: identity.subject.clone(),
            email: identity.email.clone(),
            display_name: identity.name.clone(),
            picture_url: identity.picture.clone(),
            created_utc: now,
            last_login_utc: now,
            last_verified_utc: None,
        }
    }

    /// Refresh mutable profile fields from a later sign-in.
    pub fn apply_identity(&mut self, identity: &ProviderIdentity, now: DateTime<Utc>) {
        self.email = identity.email.clone();
        self.display_name = identity.name.clone();
        self.picture_url = identity.picture.clone();
        self.last_login_utc = now;
    }
}
