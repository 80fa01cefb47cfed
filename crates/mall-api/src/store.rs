//! Backend persistence
//!
//! SQLite tables for accounts, bearer tokens and per-user chats. A chat row
//! holds the full thread document as JSON.

use std::path::Path;

use chrono::Utc;
use mall_core::session::DEFAULT_THREAD_PREVIEW;
use mall_core::{AuthData, AuthUser, Message, Thread};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{ApiError, Result};

/// PBKDF2-HMAC-SHA256 iterations for new password hashes
pub const DEFAULT_HASH_ROUNDS: u32 = 600_000;

pub struct ApiStore {
    conn: Mutex<Connection>,
    hash_rounds: u32,
}

impl ApiStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self::from_connection(conn)?;
        info!("Backend database opened: {}", db_path);
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            hash_rounds: DEFAULT_HASH_ROUNDS,
        })
    }

    /// Iterations used when hashing new passwords. Existing hashes keep
    /// the count recorded in their PHC string.
    pub fn with_hash_rounds(mut self, rounds: u32) -> Self {
        self.hash_rounds = rounds;
        self
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Register an account and issue its first token
    pub async fn register(&self, name: Option<&str>, email: &str, password: &str) -> Result<AuthData> {
        let email = normalize_email(email);
        let password = password.to_string();
        let rounds = self.hash_rounds;
        let password_hash = blocking(move || hash_password(&password, rounds)).await??;
        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.clone(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        };

        let conn = self.conn.lock().await;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(ApiError::Conflict("User already exists".to_string()));
        }

        conn.execute(
            "INSERT INTO users (id, email, name, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                user.name,
                password_hash,
                Utc::now().to_rfc3339()
            ],
        )?;
        let token = insert_token(&conn, &user.id)?;
        info!("Registered user {}", user.email);
        Ok(AuthData { token, user })
    }

    /// Check credentials and issue a new token
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthData> {
        let email = normalize_email(email);
        let row = self
            .conn
            .lock()
            .await
            .query_row(
                "SELECT id, email, name, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        AuthUser {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            name: row.get(2)?,
                        },
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((user, password_hash)) = row else {
            return Err(invalid_credentials());
        };
        let password = password.to_string();
        if !blocking(move || verify_password(&password, &password_hash)).await? {
            return Err(invalid_credentials());
        }

        let token = insert_token(&*self.conn.lock().await, &user.id)?;
        debug!("Issued token for {}", user.email);
        Ok(AuthData { token, user })
    }

    /// Resolve a bearer token to its account
    pub async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT u.id, u.email, u.name FROM tokens t
                 JOIN users u ON u.id = t.user_id WHERE t.token = ?1",
                params![token],
                |row| {
                    Ok(AuthUser {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tokens WHERE token = ?1", params![token])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// All chats of a user, newest first
    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<Thread>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT data FROM chats WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

        let mut chats = Vec::new();
        for data in rows {
            chats.push(serde_json::from_str(&data?)?);
        }
        Ok(chats)
    }

    pub async fn create_chat(&self, user_id: &str, title: Option<&str>) -> Result<Thread> {
        let thread = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => Thread::with_title(title),
            None => Thread::new(),
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chats (id, user_id, data, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                thread.id,
                user_id,
                serde_json::to_string(&thread)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        debug!("Created chat {} for user {}", thread.id, user_id);
        Ok(thread)
    }

    pub async fn get_chat(&self, user_id: &str, id: &str) -> Result<Thread> {
        let conn = self.conn.lock().await;
        load_chat(&conn, user_id, id)
    }

    /// Replace the title and/or the whole message list
    pub async fn update_chat(
        &self,
        user_id: &str,
        id: &str,
        title: Option<String>,
        messages: Option<Vec<Message>>,
    ) -> Result<Thread> {
        let conn = self.conn.lock().await;
        let mut thread = load_chat(&conn, user_id, id)?;
        if let Some(title) = title {
            thread.title = title;
        }
        if let Some(messages) = messages {
            thread.messages.clear();
            thread.last_message = DEFAULT_THREAD_PREVIEW.to_string();
            thread.append(messages);
        }
        store_chat(&conn, user_id, &thread)?;
        Ok(thread)
    }

    pub async fn append_messages(
        &self,
        user_id: &str,
        id: &str,
        messages: Vec<Message>,
    ) -> Result<Thread> {
        let conn = self.conn.lock().await;
        let mut thread = load_chat(&conn, user_id, id)?;
        thread.append(messages);
        store_chat(&conn, user_id, &thread)?;
        Ok(thread)
    }

    pub async fn delete_chat(&self, user_id: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM chats WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(chat_not_found());
        }
        info!("Deleted chat {}", id);
        Ok(())
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_string())
}

fn chat_not_found() -> ApiError {
    ApiError::NotFound("Chat not found".to_string())
}

fn load_chat(conn: &Connection, user_id: &str, id: &str) -> Result<Thread> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM chats WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    let data = data.ok_or_else(chat_not_found)?;
    Ok(serde_json::from_str(&data)?)
}

fn store_chat(conn: &Connection, user_id: &str, thread: &Thread) -> Result<()> {
    conn.execute(
        "UPDATE chats SET data = ?1 WHERE id = ?2 AND user_id = ?3",
        params![serde_json::to_string(thread)?, thread.id, user_id],
    )?;
    Ok(())
}

fn insert_token(conn: &Connection, user_id: &str) -> Result<String> {
    let token = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, Utc::now().to_rfc3339()],
    )?;
    Ok(token)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Run CPU-bound work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// PBKDF2-HMAC-SHA256 with a random salt, as a PHC string
fn hash_password(password: &str, rounds: u32) -> Result<String> {
    let kdf_error = |e: pbkdf2::password_hash::Error| ApiError::Internal(e.to_string());
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes()).map_err(kdf_error)?;
    let params = Params {
        rounds,
        ..Params::default()
    };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(kdf_error)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Unreadable stored password hash: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mall_core::AssistantPayload;

    const TEST_ROUNDS: u32 = 1_000;

    fn test_store() -> ApiStore {
        ApiStore::in_memory().unwrap().with_hash_rounds(TEST_ROUNDS)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let store = test_store();
        let registered = store.register(Some("Asha"), "Asha@Example.com", "pw").await.unwrap();
        assert_eq!(registered.user.email, "asha@example.com");
        assert_eq!(registered.user.name.as_deref(), Some("Asha"));

        let login = store.login("asha@example.com ", "pw").await.unwrap();
        assert_eq!(login.user, registered.user);
        assert_ne!(login.token, registered.token);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = test_store();
        store.register(None, "a@b.c", "pw").await.unwrap();
        let err = store.register(None, "A@B.C", "other").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let store = test_store();
        store.register(None, "a@b.c", "pw").await.unwrap();

        for (email, password) in [("a@b.c", "nope"), ("x@y.z", "pw")] {
            let err = store.login(email, password).await.unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized(msg) if msg == "Invalid credentials"));
        }
    }

    #[test]
    fn test_password_hash_is_salted_phc() {
        let a = hash_password("secret", TEST_ROUNDS).unwrap();
        let b = hash_password("secret", TEST_ROUNDS).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$pbkdf2-sha256$i=1000"));
        assert!(!a.contains("secret"));

        assert!(verify_password("secret", &a));
        assert!(verify_password("secret", &b));
        assert!(!verify_password("Secret", &a));
        assert!(!verify_password("secret", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_stored_hash_verifies_with_recorded_rounds() {
        let store = test_store();
        store.register(None, "a@b.c", "pw").await.unwrap();

        let stored: String = store
            .conn
            .lock()
            .await
            .query_row(
                "SELECT password_hash FROM users WHERE email = 'a@b.c'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$"));
        assert!(!stored.contains("pw"));

        // a later change to the default does not break existing accounts
        let store = store.with_hash_rounds(2_000);
        assert!(store.login("a@b.c", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = test_store();
        let auth = store.register(None, "a@b.c", "pw").await.unwrap();

        let user = store.user_for_token(&auth.token).await.unwrap();
        assert_eq!(user, Some(auth.user.clone()));

        store.revoke_token(&auth.token).await.unwrap();
        assert!(store.user_for_token(&auth.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chats_are_scoped_per_user() {
        let store = test_store();
        let alice = store.register(None, "alice@x.io", "pw").await.unwrap().user;
        let bob = store.register(None, "bob@x.io", "pw").await.unwrap().user;

        let first = store.create_chat(&alice.id, None).await.unwrap();
        let second = store.create_chat(&alice.id, Some("Shoes")).await.unwrap();

        let chats = store.list_chats(&alice.id).await.unwrap();
        let ids: Vec<_> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(chats[0].title, "Shoes");

        assert!(store.list_chats(&bob.id).await.unwrap().is_empty());
        assert!(matches!(
            store.get_chat(&bob.id, &first.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_chat(&bob.id, &first.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_and_replace_messages() {
        let store = test_store();
        let user = store.register(None, "a@b.c", "pw").await.unwrap().user;
        let chat = store.create_chat(&user.id, None).await.unwrap();

        let updated = store
            .append_messages(
                &user.id,
                &chat.id,
                vec![
                    Message::user("red shoes"),
                    Message::assistant(AssistantPayload::text("Try these")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated.message_count(), 2);
        assert_eq!(updated.last_message, "Try these");

        let cleared = store
            .update_chat(&user.id, &chat.id, Some("Renamed".into()), Some(Vec::new()))
            .await
            .unwrap();
        assert_eq!(cleared.title, "Renamed");
        assert!(cleared.is_empty());
        assert_eq!(cleared.last_message, DEFAULT_THREAD_PREVIEW);

        let reloaded = store.get_chat(&user.id, &chat.id).await.unwrap();
        assert_eq!(reloaded, cleared);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.db");
        let path = path.to_str().unwrap();

        let token = {
            let store = ApiStore::open(path).unwrap().with_hash_rounds(TEST_ROUNDS);
            store.register(None, "a@b.c", "pw").await.unwrap().token
        };

        let reopened = ApiStore::open(path).unwrap();
        assert!(reopened.user_for_token(&token).await.unwrap().is_some());
    }
}
