//! Conversation controller
//!
//! Owns the thread list shown to the user, the active thread and the
//! responder selection.

use std::sync::Arc;

use tracing::{debug, info};

use crate::conversation::{ExchangeError, ExchangeOutcome, MessageExchange};
use crate::responder::{ResponderMode, ResponderSelector};
use crate::session::{SessionManager, SessionStore, Thread};
use crate::{Error, Result};

pub struct ConversationController {
    sessions: Arc<SessionManager>,
    exchange: Arc<MessageExchange>,
    threads: Vec<Thread>,
    active_thread_id: Option<String>,
    reset_messages: bool,
    selector: ResponderSelector,
}

impl ConversationController {
    /// Load persisted threads and activate the first one, if any
    pub async fn start(
        sessions: Arc<SessionManager>,
        exchange: Arc<MessageExchange>,
        mode: ResponderMode,
    ) -> Self {
        let threads = sessions.load_threads().await;
        let active_thread_id = threads.first().map(|t| t.id.clone());

        match &active_thread_id {
            Some(id) => {
                exchange.activate(id).await;
            }
            None => exchange.reset(None).await,
        }

        info!(
            "Loaded {} threads (active: {})",
            threads.len(),
            active_thread_id.as_deref().unwrap_or("none")
        );

        Self {
            sessions,
            exchange,
            threads,
            active_thread_id,
            reset_messages: false,
            selector: ResponderSelector::new(mode),
        }
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn active_thread_id(&self) -> Option<&str> {
        self.active_thread_id.as_deref()
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        let id = self.active_thread_id.as_deref()?;
        SessionStore::find_thread(&self.threads, id)
    }

    /// Set by `create_thread`, cleared by `select_thread`
    pub fn should_reset_messages(&self) -> bool {
        self.reset_messages
    }

    pub fn exchange(&self) -> &Arc<MessageExchange> {
        &self.exchange
    }

    /// Create an empty thread, persist it at the front of the list and
    /// make it active.
    pub async fn create_thread(&mut self) -> Result<Thread> {
        let thread = Thread::new();
        self.threads = self.sessions.prepend_thread(thread.clone()).await?;
        self.active_thread_id = Some(thread.id.clone());
        self.reset_messages = true;
        self.exchange.reset(Some(&thread.id)).await;
        Ok(thread)
    }

    /// Make an existing thread active and show its persisted messages
    pub async fn select_thread(&mut self, id: &str) -> Result<()> {
        if SessionStore::find_thread(&self.threads, id).is_none() {
            self.refresh_threads().await;
            if SessionStore::find_thread(&self.threads, id).is_none() {
                return Err(Error::ThreadNotFound(id.to_string()));
            }
        }

        debug!("Selecting thread {}", id);
        self.active_thread_id = Some(id.to_string());
        self.reset_messages = false;
        self.exchange.activate(id).await;
        Ok(())
    }

    /// Reload the thread list from the store
    pub async fn refresh_threads(&mut self) {
        self.threads = self.sessions.load_threads().await;
    }

    /// Send user input to the selected responder in the active thread
    pub async fn send(&self, input: &str) -> std::result::Result<Option<ExchangeOutcome>, ExchangeError> {
        self.exchange
            .send(input, self.active_thread_id.as_deref(), self.selector.mode())
            .await
    }

    pub fn responder_mode(&self) -> ResponderMode {
        self.selector.mode()
    }

    pub fn set_responder_mode(&mut self, mode: ResponderMode) {
        self.selector.set(mode);
    }

    pub fn toggle_responder(&mut self) -> ResponderMode {
        self.selector.toggle()
    }
}
