mod access;
mod admin;
pub mod dto;
mod projects;
mod resources;
pub mod response;
mod router;

pub use admin::admin_router;
pub use router::{AppState, create_router};
