//! HTTP handlers for the family auth service.

pub mod admin;
pub mod families;
pub mod metrics;
pub mod oauth;
pub mod session;
pub mod verify;

pub use admin::*;
pub use families::*;
pub use oauth::*;
pub use session::*;
pub use verify::*;
