//! mall-api: MallChat backend service
//!
//! Account registration/login and per-user chat storage over HTTP.
//! Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod store;

pub use error::{ApiError, Result};
pub use server::{AppState, build_router, start_server};
pub use store::ApiStore;
