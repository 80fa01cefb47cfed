//! Middleware modules
//!
//! Contains bearer-token authentication.

pub mod auth;

pub use auth::{CurrentUser, require_auth};
