pub mod challenge;
pub mod cookie_helpers;
pub mod middleware;

pub use challenge::ChallengeIssuer;
