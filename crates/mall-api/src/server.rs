//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mall_core::Config;

use crate::routes::routes;
use crate::store::ApiStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ApiStore>,
}

impl AppState {
    pub fn new(config: Config, store: ApiStore) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
        }
    }
}

/// Build the router with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.api.allowed_origins.as_deref());
    Router::new()
        .merge(routes(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin unless an explicit list is configured
fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Start the HTTP API server
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let store = ApiStore::open(&config.storage.server_db_path)?;
    let port = config.api.port;
    let app = build_router(AppState::new(config, store));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app_with(config: Config) -> Router {
        let store = ApiStore::in_memory().unwrap().with_hash_rounds(1_000);
        build_router(AppState::new(config, store))
    }

    fn app() -> Router {
        app_with(Config::default())
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, email: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"name": "Asha", "email": email, "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_register_login_me_logout() {
        let app = app();
        register(&app, "a@b.c").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.c", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "a@b.c");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Asha");

        let (status, _) = call(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_errors() {
        let app = app();
        register(&app, "a@b.c").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.c", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid credentials"}));

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "a@b.c", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "x@y.z"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_chats_require_token() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/chats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, _) = call(&app, "GET", "/api/chats", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_crud() {
        let app = app();
        let token = register(&app, "a@b.c").await;

        let (status, created) = call(&app, "POST", "/api/chats", Some(&token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["title"], "New Conversation");
        assert_eq!(created["lastMessage"], "Start a new product discovery conversation");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/chats",
            Some(&token),
            Some(json!({"title": "Laptops"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, list) = call(&app, "GET", "/api/chats", Some(&token), None).await;
        let titles: Vec<_> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Laptops", "New Conversation"]);

        let message = json!({
            "id": "m1",
            "content": "red shoes",
            "sender": "user",
            "timestamp": "2024-05-01T10:00:00Z",
            "query": "red shoes"
        });
        let (status, chat) = call(
            &app,
            "POST",
            &format!("/api/chats/{}/messages", id),
            Some(&token),
            Some(json!({"messages": [message]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chat["messages"].as_array().unwrap().len(), 1);
        assert_eq!(chat["lastMessage"], "red shoes");

        let (status, chat) = call(
            &app,
            "PUT",
            &format!("/api/chats/{}", id),
            Some(&token),
            Some(json!({"title": "Shoes"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chat["title"], "Shoes");
        assert_eq!(chat["messages"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/chats/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "GET", &format!("/api/chats/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "Chat not found"}));
    }

    #[tokio::test]
    async fn test_foreign_chat_is_not_found() {
        let app = app();
        let owner = register(&app, "owner@x.io").await;
        let other = register(&app, "other@x.io").await;

        let (_, created) = call(&app, "POST", "/api/chats", Some(&owner), None).await;
        let uri = format!("/api/chats/{}", created["id"].as_str().unwrap());

        let (status, _) = call(&app, "GET", &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = call(&app, "GET", "/api/chats", Some(&other), None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_cors_permissive_by_default() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_allowed_origins() {
        let mut config = Config::default();
        config.api.allowed_origins = Some(vec!["http://shop.example".to_string()]);
        let app = app_with(config);

        for (origin, allowed) in [("http://shop.example", true), ("http://evil.example", false)] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .header(header::ORIGIN, origin)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let allow = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
            assert_eq!(allow.is_some(), allowed, "origin {}", origin);
        }
    }
}
