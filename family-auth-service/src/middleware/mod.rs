pub mod admin;
pub mod auth;

pub use admin::{admin_session_middleware, bearer_token, AdminUser, ADMIN_API_KEY_HEADER};
pub use auth::{ClientContext, PendingUser, SessionUser};
