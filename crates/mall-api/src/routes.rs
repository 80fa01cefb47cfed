//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{
    append_messages, create_chat, delete_chat, get_chat, health, list_chats, login, logout, me,
    register, update_chat,
};
use crate::middleware::require_auth;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    // Bearer token required
    let protected = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/chats", get(list_chats).post(create_chat))
        .route(
            "/api/chats/{id}",
            get(get_chat).put(update_chat).delete(delete_chat),
        )
        .route("/api/chats/{id}/messages", post(append_messages))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        // Health check
        .route("/health", get(health))
        // Accounts
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .merge(protected)
}
