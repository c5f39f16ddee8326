pub mod admin;
pub mod auth;

pub use admin::{AdminSessionRequest, AdminSessionResponse, FamilyMembersResponse};
pub use auth::{
    CallbackQuery, ChallengeResponse, ConsentRequest, ConsentResponse, FamiliesResponse,
    MeResponse, ResendRequest, StartQuery, VerifyRequest,
};
