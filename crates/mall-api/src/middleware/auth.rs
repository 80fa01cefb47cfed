//! Authentication middleware
//!
//! Resolves `Authorization: Bearer <token>` against the token table and
//! attaches the account to the request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use mall_core::AuthUser;
use tracing::debug;

use crate::server::AppState;
use crate::ApiError;

/// Account behind the request's bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: AuthUser,
    pub token: String,
}

/// Bearer token authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

    let user = state
        .store
        .user_for_token(&token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Token is not valid".to_string()))?;

    debug!("Authenticated request for {}", user.email);
    request.extensions_mut().insert(CurrentUser { user, token });
    Ok(next.run(request).await)
}

/// Extract the token from a `Bearer` authorization value
pub fn bearer_token(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc".to_string()));
        assert_eq!(bearer_token("bearer  abc "), Some("abc".to_string()));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
