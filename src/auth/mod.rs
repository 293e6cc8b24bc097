mod helpers;
mod middleware;
mod token;

pub use helpers::{ValidatedToken, validate_token};
pub use middleware::{PROJECT_HEADER, RequireAdmin, RequireAuth, RequireContext};
pub use token::{TokenGenerator, parse_token};
