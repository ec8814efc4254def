//! DocVault
//!
//! A document server with session-token authentication, per-document access
//! policies and a cache-aside read path.

pub mod access;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod models;
pub mod server;
pub mod tasks;

pub use auth::AuthService;
pub use config::{Config, ConfigError};
pub use documents::DocumentService;
pub use error::{ServiceError, ServiceResult};
