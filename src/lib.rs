//! # Vellum
//!
//! A versioned content repository. Authors change files and folders in offline
//! projects, guarded by access control lists and exclusive locks, and publish
//! those changes to the online workspace. Usable both as a standalone server
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! vellum = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vellum::config::RepositoryConfig;
//! use vellum::repository::Repository;
//! use vellum::server::{AppState, create_router};
//!
//! let repository = Arc::new(Repository::open(RepositoryConfig::load("./data/vellum.toml")?)?);
//! let router = create_router(Arc::new(AppState { repository }));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `vellum` binary. Disable with `default-features = false`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod lock;
pub mod project;
pub mod publish;
pub mod repository;
pub mod security;
pub mod server;
pub mod store;
pub mod types;
pub mod vfs;
