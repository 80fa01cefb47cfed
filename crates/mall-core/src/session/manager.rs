//! Session management
//!
//! Serializes every read-modify-write of the persisted thread list so that
//! concurrent exchanges cannot overwrite each other's messages.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::AuthData;
use crate::session::store::AUTH_KEY;
use crate::session::{Message, SessionStore, Thread};
use crate::Result;

/// Single-writer front end over [`SessionStore`]
pub struct SessionManager {
    store: Arc<Mutex<SessionStore>>,
}

impl SessionManager {
    /// Create a new session manager with a database path
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self::from_store(SessionStore::new(db_path)?))
    }

    /// Create an in-memory session manager (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_store(SessionStore::in_memory()?))
    }

    pub fn from_store(store: SessionStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Load all persisted threads (empty on missing or malformed data)
    pub async fn load_threads(&self) -> Vec<Thread> {
        self.store.lock().await.load()
    }

    /// Overwrite the persisted thread list
    pub async fn save_threads(&self, threads: &[Thread]) -> Result<()> {
        self.store.lock().await.save(threads)
    }

    pub async fn find_thread(&self, id: &str) -> Option<Thread> {
        let threads = self.load_threads().await;
        SessionStore::find_thread(&threads, id).cloned()
    }

    /// Insert a thread at the front of the persisted list.
    ///
    /// Returns the list as persisted. Fails without writing when the
    /// existing list cannot be read.
    pub async fn prepend_thread(&self, thread: Thread) -> Result<Vec<Thread>> {
        let store = self.store.lock().await;
        let mut threads = store.try_load()?;
        info!("Creating thread: {}", thread.id);
        threads.insert(0, thread);
        store.save(&threads)?;
        Ok(threads)
    }

    /// Append messages to a persisted thread, skipping any whose id the
    /// thread already holds.
    ///
    /// Returns `false` (and writes nothing) when the thread does not exist.
    pub async fn append_messages(&self, thread_id: &str, messages: Vec<Message>) -> Result<bool> {
        let store = self.store.lock().await;
        let mut threads = store.try_load()?;

        let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) else {
            warn!("Thread {} not found, exchange not persisted", thread_id);
            return Ok(false);
        };

        let mut seen: HashSet<String> = thread.messages.iter().map(|m| m.id.clone()).collect();
        let new: Vec<Message> = messages
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        if new.is_empty() {
            return Ok(true);
        }

        let count = new.len();
        thread.append(new);
        store.save(&threads)?;
        debug!("Appended {} messages to thread {}", count, thread_id);
        Ok(true)
    }

    /// Persist login data for later sessions
    pub async fn save_auth(&self, auth: &AuthData) -> Result<()> {
        let json = serde_json::to_string(auth)?;
        self.store.lock().await.put_raw(AUTH_KEY, &json)
    }

    /// Saved login data, if any
    pub async fn load_auth(&self) -> Option<AuthData> {
        let raw = match self.store.lock().await.get_raw(AUTH_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read saved login: {}", e);
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!("Ignoring malformed saved login: {}", e))
            .ok()
    }

    pub async fn clear_auth(&self) -> Result<()> {
        self.store.lock().await.remove(AUTH_KEY)
    }
}
