//! Account login against the backend
//!
//! The resulting [`AuthData`] is kept in the session store under the
//! `auth` key.

mod client;

pub use client::{AuthClient, LOGIN_FAILED, MISSING_CREDENTIALS};

use serde::{Deserialize, Serialize};

/// Account returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Bearer token plus the account it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    pub token: String,
    pub user: AuthUser,
}

impl AuthUser {
    /// Name if set, email otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}
