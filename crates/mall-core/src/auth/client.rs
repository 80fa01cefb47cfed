//! HTTP client for `/api/auth`

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::AuthData;
use crate::config::Config;
use crate::{Error, Result};

pub const MISSING_CREDENTIALS: &str = "Please enter both email and password";
pub const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http.timeout())
            .build()
            .map_err(Error::Http)?;
        Ok(Self::with_client(client, &config.api.backend_url))
    }

    /// Create with custom client (for testing)
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthData> {
        check_credentials(email, password)?;
        let body = json!({ "email": email, "password": password });
        let auth = self.post("login", &body).await?;
        info!("Logged in as {}", auth.user.email);
        Ok(auth)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthData> {
        check_credentials(email, password)?;
        let body = json!({ "name": name, "email": email, "password": password });
        let auth = self.post("register", &body).await?;
        info!("Registered {}", auth.user.email);
        Ok(auth)
    }

    /// Revoke `token` on the backend
    pub async fn logout(&self, token: &str) -> Result<()> {
        let url = format!("{}/api/auth/logout", self.base_url);
        let response = self.client.post(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            warn!("Logout returned {}", response.status());
        }
        Ok(())
    }

    async fn post(&self, action: &str, body: &serde_json::Value) -> Result<AuthData> {
        let url = format!("{}/api/auth/{}", self.base_url, action);
        debug!("Auth request: {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Auth request failed: {}", e);
                Error::Auth(LOGIN_FAILED.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| LOGIN_FAILED.to_string());
            warn!("Auth {} rejected: {} - {}", action, status, message);
            return Err(Error::Auth(message));
        }

        response
            .json()
            .await
            .map_err(|_| Error::Auth(LOGIN_FAILED.to_string()))
    }
}

fn check_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::Auth(MISSING_CREDENTIALS.to_string()));
    }
    Ok(())
}
