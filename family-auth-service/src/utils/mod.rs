pub mod crypto;
pub mod validation;

pub use crypto::{constant_time_eq, numeric_code, random_token, sha256_hex};
pub use validation::ValidatedJson;
