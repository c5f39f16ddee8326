pub mod admin_session;
pub mod consent;
pub mod family;
pub mod family_access;
pub mod oauth_state;
pub mod user;
pub mod verification_token;

pub use admin_session::AdminSession;
pub use consent::{FamilyMember, UserConsent, CONSENT_VERSION};
pub use family::{FamilyId, FamilyProfile};
pub use family_access::{FamilyAccess, GrantSource};
pub use oauth_state::PendingAuthorization;
pub use user::{ProviderIdentity, User};
pub use verification_token::{ChallengeKey, VerificationPurpose, VerificationToken};
