//! HTTP API handlers
//!
//! Request handlers for accounts and chat storage.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use mall_core::{AuthData, AuthUser, Message, Thread};
use serde::Deserialize;
use tracing::{debug, info};

use crate::middleware::CurrentUser;
use crate::server::AppState;
use crate::{ApiError, Result};

// ============================================================================
// Request types
// ============================================================================

/// Register request payload
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Login request payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Create chat payload
#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    pub title: Option<String>,
}

/// Update chat payload
#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
}

/// Append messages payload
#[derive(Debug, Deserialize)]
pub struct AppendMessagesRequest {
    pub messages: Vec<Message>,
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<(String, String)> {
    match (email, password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            Ok((email, password))
        }
        _ => Err(ApiError::BadRequest(
            "Please enter both email and password".to_string(),
        )),
    }
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthData>)> {
    let (email, password) = credentials(req.email, req.password)?;
    let auth = state
        .store
        .register(req.name.as_deref(), &email, &password)
        .await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthData>> {
    let (email, password) = credentials(req.email, req.password)?;
    let auth = state.store.login(&email, &password).await?;
    info!("User logged in: {}", auth.user.email);
    Ok(Json(auth))
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<AuthUser> {
    Json(current.user)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<StatusCode> {
    state.store.revoke_token(&current.token).await?;
    info!("User logged out: {}", current.user.email);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Thread>>> {
    let chats = state.store.list_chats(&current.user.id).await?;
    debug!("Listing {} chats for {}", chats.len(), current.user.email);
    Ok(Json(chats))
}

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    body: Bytes,
) -> Result<(StatusCode, Json<Thread>)> {
    // body is optional
    let req: CreateChatRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateChatRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let chat = state
        .store
        .create_chat(&current.user.id, req.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<Thread>> {
    Ok(Json(state.store.get_chat(&current.user.id, &id).await?))
}

pub async fn update_chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateChatRequest>,
) -> Result<Json<Thread>> {
    let chat = state
        .store
        .update_chat(&current.user.id, &id, req.title, req.messages)
        .await?;
    Ok(Json(chat))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.delete_chat(&current.user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn append_messages(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessagesRequest>,
) -> Result<Json<Thread>> {
    let chat = state
        .store
        .append_messages(&current.user.id, &id, req.messages)
        .await?;
    Ok(Json(chat))
}
