use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Failures of the access-control store. Never shown to clients.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Integrity error: {0}")]
    Integrity(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unknown family: {0}")]
    InvalidFamily(String),

    #[error("Malformed authorization state")]
    MalformedState,

    #[error("Authorization state does not match an outstanding request")]
    CsrfMismatch,

    #[error("Identity provider exchange failed: {0}")]
    ProviderExchangeFailed(String),

    #[error("Google account email is not verified")]
    ProviderEmailUnverified,

    #[error("Verification email could not be sent: {0}")]
    EmailDispatchFailed(String),

    #[error("No active verification code, request a new one")]
    NoActiveChallenge,

    #[error("Verification code expired, request a new one")]
    ChallengeExpired,

    #[error("Verification code does not match")]
    CodeMismatch,

    #[error("Session signature invalid")]
    InvalidSignature,

    #[error("Session expired")]
    SessionExpired,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Error body returned by every endpoint of this service.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "Verification code expired, request a new one")]
    pub error: String,
    #[schema(example = "challenge_expired")]
    pub code: &'static str,
    pub retryable: bool,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidFamily(_) => "invalid_family",
            AuthError::MalformedState => "malformed_state",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::ProviderExchangeFailed(_) => "provider_exchange_failed",
            AuthError::ProviderEmailUnverified => "provider_email_unverified",
            AuthError::EmailDispatchFailed(_) => "email_dispatch_failed",
            AuthError::NoActiveChallenge => "no_active_challenge",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::CodeMismatch => "code_mismatch",
            AuthError::InvalidSignature | AuthError::SessionExpired | AuthError::Unauthenticated => {
                "unauthenticated"
            }
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::Unavailable(_) => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidFamily(_)
            | AuthError::MalformedState
            | AuthError::CsrfMismatch
            | AuthError::CodeMismatch
            | AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::ProviderExchangeFailed(_) => StatusCode::BAD_GATEWAY,
            AuthError::ProviderEmailUnverified => StatusCode::FORBIDDEN,
            AuthError::NoActiveChallenge => StatusCode::CONFLICT,
            AuthError::ChallengeExpired => StatusCode::GONE,
            AuthError::InvalidSignature | AuthError::SessionExpired | AuthError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::EmailDispatchFailed(_) | AuthError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::ProviderExchangeFailed(_)
                | AuthError::EmailDispatchFailed(_)
                | AuthError::Unavailable(_)
        )
    }

    /// Tampering indicators rather than ordinary user mistakes.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedState | AuthError::CsrfMismatch | AuthError::InvalidSignature
        )
    }

    /// Message safe to show a client. Session and infrastructure failures carry no detail.
    fn public_message(&self) -> String {
        match self {
            AuthError::InvalidSignature | AuthError::SessionExpired | AuthError::Unauthenticated => {
                "Not authenticated".to_string()
            }
            AuthError::ProviderExchangeFailed(_) => {
                "Sign-in with Google failed, please try again".to_string()
            }
            AuthError::EmailDispatchFailed(_) => {
                "Verification email could not be sent, please try again".to_string()
            }
            AuthError::Unavailable(_) => "Service temporarily unavailable, try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.is_security_event() {
            tracing::warn!(security_event = true, kind = self.code(), error = %self, "Rejected tampered or replayed request");
            metrics::counter!("security_events_total", "kind" => self.code()).increment(1);
        } else if status.is_server_error() {
            tracing::warn!(kind = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(kind = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            code: self.code(),
            retryable: self.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
