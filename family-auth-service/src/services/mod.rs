//! Services layer for the family auth service.
//!
//! OAuth sign-in, email verification, sessions, the access-control store and the
//! admin surface.

pub mod admin;
pub mod directory;
mod email;
pub mod error;
pub mod metrics;
pub mod oauth;
pub mod session;
pub mod store;
pub mod sweeper;
pub mod verification;

pub use admin::{AdminService, OpenedAdminSession};
pub use directory::FamilyDirectory;
pub use email::{EmailProvider, EmailService, MockEmailService, VerificationEmail};
pub use error::{AuthError, ErrorBody, StoreError};
pub use oauth::{
    AuthorizationRedirect, AuthorizationState, CompletedAuthorization, GoogleProvider,
    IdentityProvider, OAuthCoordinator,
};
pub use session::{IssuedToken, SessionClaims, SessionService, TokenKind, PENDING_COOKIE, SESSION_COOKIE};
pub use store::{AccessStore, InMemoryStore, PostgresStore, SweepReport};
pub use sweeper::{spawn_sweeper, sweep_once};
pub use verification::{IssuedChallenge, VerificationService};
