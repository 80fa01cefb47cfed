//! Local thread persistence using SQLite
//!
//! The store is a small key-value table. Each key holds one JSON document
//! that is always replaced as a whole.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::session::Thread;
use crate::Result;

/// Key of the persisted thread list
pub const CHATS_KEY: &str = "chats";

/// Key of the saved login
pub const AUTH_KEY: &str = "auth";

/// SQLite-based key-value store for the chat client
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening session store at: {}", db_path);
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Read the raw document stored under `key`
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Replace the document stored under `key`
    pub fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove the document stored under `key`
    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Load the persisted thread list for display.
    ///
    /// Missing, unreadable or malformed data yields an empty list.
    pub fn load(&self) -> Vec<Thread> {
        self.try_load().unwrap_or_else(|e| {
            warn!("Ignoring unreadable persisted chats: {}", e);
            Vec::new()
        })
    }

    /// Load the persisted thread list, failing on unreadable or malformed
    /// data. Only a missing document yields an empty list.
    pub fn try_load(&self) -> Result<Vec<Thread>> {
        match self.get_raw(CHATS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the persisted thread list entirely
    pub fn save(&self, threads: &[Thread]) -> Result<()> {
        let json = serde_json::to_string(threads)?;
        self.put_raw(CHATS_KEY, &json)?;
        debug!("Saved {} threads", threads.len());
        Ok(())
    }

    /// Find a thread by id
    pub fn find_thread<'a>(threads: &'a [Thread], id: &str) -> Option<&'a Thread> {
        threads.iter().find(|t| t.id == id)
    }
}
