//! Message exchange
//!
//! Turns one user input into one user message and one assistant message,
//! calling exactly one responder per exchange.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::responder::{ResponderMode, Responders};
use crate::session::{Message, SessionManager};

/// Failure of a single exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{mode} responder failed: {source}")]
    Responder {
        mode: ResponderMode,
        #[source]
        source: crate::Error,
    },

    #[error("failed to persist exchange for thread {thread_id}: {source}")]
    Persist {
        thread_id: String,
        #[source]
        source: crate::Error,
    },
}

/// Result of a successful exchange
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub user: Message,
    pub assistant: Message,
    /// Whether the pair was written to the active thread
    pub persisted: bool,
}

/// Messages currently shown for one thread
#[derive(Debug, Default)]
struct View {
    thread_id: Option<String>,
    messages: Vec<Message>,
}

/// Lowers the typing indicator when the responder call ends, even if the
/// exchange future is dropped mid-call.
struct TypingGuard<'a>(&'a watch::Sender<usize>);

impl<'a> TypingGuard<'a> {
    fn raise(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self(in_flight)
    }
}

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

pub struct MessageExchange {
    sessions: Arc<SessionManager>,
    responders: Responders,
    view: RwLock<View>,
    in_flight: watch::Sender<usize>,
}

impl MessageExchange {
    pub fn new(sessions: Arc<SessionManager>, responders: Responders) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            sessions,
            responders,
            view: RwLock::new(View::default()),
            in_flight,
        }
    }

    /// Run one exchange.
    ///
    /// Blank input is ignored (`Ok(None)`): nothing is appended and no
    /// responder is called.
    pub async fn send(
        &self,
        input: &str,
        thread_id: Option<&str>,
        mode: ResponderMode,
    ) -> Result<Option<ExchangeOutcome>, ExchangeError> {
        if input.trim().is_empty() {
            debug!("Ignoring blank input");
            return Ok(None);
        }

        let user = Message::user(input);
        self.view.write().await.messages.push(user.clone());

        let responder = self.responders.get(mode);
        debug!("Dispatching to {} responder", responder.name());

        let result = {
            let _typing = TypingGuard::raise(&self.in_flight);
            responder.respond(input).await
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Error fetching response from {}: {}", responder.name(), e);
                return Err(ExchangeError::Responder { mode, source: e });
            }
        };

        let assistant = Message::assistant(payload);
        // everything shown for this thread, including turns of earlier
        // failed exchanges, then this pair
        let mut batch = Vec::new();
        {
            let mut view = self.view.write().await;
            if view.thread_id.as_deref() == thread_id {
                batch = view.messages.clone();
                view.messages.push(assistant.clone());
            } else {
                debug!("View switched threads during exchange, reply not shown");
            }
        }
        batch.push(user.clone());
        batch.push(assistant.clone());

        let persisted = match thread_id {
            Some(id) => self
                .sessions
                .append_messages(id, batch)
                .await
                .map_err(|source| ExchangeError::Persist {
                    thread_id: id.to_string(),
                    source,
                })?,
            None => {
                debug!("No active thread, exchange not persisted");
                false
            }
        };

        info!(
            "Exchange complete via {} (persisted: {})",
            responder.name(),
            persisted
        );

        Ok(Some(ExchangeOutcome {
            user,
            assistant,
            persisted,
        }))
    }

    /// Clear the visible messages and show `thread_id`
    pub async fn reset(&self, thread_id: Option<&str>) {
        let mut view = self.view.write().await;
        view.thread_id = thread_id.map(str::to_string);
        view.messages.clear();
    }

    /// Show the persisted messages of `thread_id`.
    ///
    /// Returns `false` when the thread does not exist; the view is then
    /// left empty.
    pub async fn activate(&self, thread_id: &str) -> bool {
        let thread = self.sessions.find_thread(thread_id).await;
        let mut view = self.view.write().await;
        view.thread_id = Some(thread_id.to_string());
        match thread {
            Some(thread) => {
                view.messages = thread.messages;
                true
            }
            None => {
                view.messages.clear();
                false
            }
        }
    }

    /// Snapshot of the visible messages
    pub async fn messages(&self) -> Vec<Message> {
        self.view.read().await.messages.clone()
    }

    pub async fn view_thread_id(&self) -> Option<String> {
        self.view.read().await.thread_id.clone()
    }

    /// True while at least one responder call is outstanding
    pub fn is_typing(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    /// Number of outstanding responder calls; typing while non-zero
    pub fn typing(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::responder::{AssistantPayload, Responder};
    use crate::session::Thread;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies `reply to <query>` after a delay taken from the query
    pub(crate) struct ScriptedResponder {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl ScriptedResponder {
        pub fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn respond(&self, query: &str) -> crate::Result<AssistantPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if self.fail {
                return Err(crate::Error::ProductSearch("503 Service Unavailable".to_string()));
            }
            Ok(AssistantPayload::text(format!("reply to {}", query)))
        }
    }

    pub(crate) fn responders(
        generative: Arc<ScriptedResponder>,
        search: Arc<ScriptedResponder>,
    ) -> Responders {
        Responders::new(generative, search)
    }

    async fn setup(
        responder: Arc<ScriptedResponder>,
    ) -> (Arc<SessionManager>, Arc<MessageExchange>, Thread) {
        let sessions = Arc::new(SessionManager::in_memory().unwrap());
        let thread = Thread::new();
        sessions.prepend_thread(thread.clone()).await.unwrap();
        let exchange = Arc::new(MessageExchange::new(
            Arc::clone(&sessions),
            responders(Arc::clone(&responder), responder),
        ));
        exchange.activate(&thread.id).await;
        (sessions, exchange, thread)
    }

    #[tokio::test]
    async fn test_send_appends_user_and_one_assistant() {
        let responder = ScriptedResponder::ok();
        let (sessions, exchange, thread) = setup(Arc::clone(&responder)).await;

        let outcome = exchange
            .send("red shoes", Some(&thread.id), ResponderMode::GenerativeText)
            .await
            .unwrap()
            .unwrap();

        assert!(outcome.persisted);
        assert_eq!(outcome.user.content, "red shoes");
        assert_eq!(outcome.assistant.content, "reply to red shoes");
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);

        let visible = exchange.messages().await;
        assert_eq!(visible, vec![outcome.user.clone(), outcome.assistant.clone()]);

        let persisted = sessions.find_thread(&thread.id).await.unwrap();
        assert_eq!(persisted.messages, visible);
        assert!(!exchange.is_typing());
    }

    #[tokio::test]
    async fn test_blank_input_is_noop() {
        let responder = ScriptedResponder::ok();
        let (sessions, exchange, thread) = setup(Arc::clone(&responder)).await;

        for input in ["", "   ", "\n\t"] {
            let outcome = exchange
                .send(input, Some(&thread.id), ResponderMode::ProductSearch)
                .await
                .unwrap();
            assert!(outcome.is_none());
        }

        assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
        assert!(exchange.messages().await.is_empty());
        assert!(sessions.find_thread(&thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_user_message_and_persists_nothing() {
        let responder = ScriptedResponder::failing();
        let (sessions, exchange, thread) = setup(responder).await;

        let err = exchange
            .send("red shoes", Some(&thread.id), ResponderMode::ProductSearch)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::Responder {
                mode: ResponderMode::ProductSearch,
                ..
            }
        ));
        let visible = exchange.messages().await;
        assert_eq!(visible.len(), 1);
        assert!(visible[0].is_user());
        assert!(!exchange.is_typing());
        assert!(sessions.find_thread(&thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typing_indicator_while_in_flight() {
        let (_sessions, exchange, thread) = setup(ScriptedResponder::ok()).await;
        let mut typing = exchange.typing();
        assert_eq!(*typing.borrow_and_update(), 0);

        let task = {
            let exchange = Arc::clone(&exchange);
            let id = thread.id.clone();
            tokio::spawn(async move {
                exchange
                    .send("slow query", Some(&id), ResponderMode::GenerativeText)
                    .await
            })
        };

        typing.changed().await.unwrap();
        assert!(exchange.is_typing());

        task.await.unwrap().unwrap();
        assert!(!exchange.is_typing());
    }

    #[tokio::test]
    async fn test_concurrent_sends_out_of_order_are_both_persisted() {
        let (sessions, exchange, thread) = setup(ScriptedResponder::ok()).await;

        let (slow, fast) = tokio::join!(
            exchange.send("slow request", Some(&thread.id), ResponderMode::GenerativeText),
            exchange.send("fast request", Some(&thread.id), ResponderMode::GenerativeText),
        );
        assert!(slow.unwrap().unwrap().persisted);
        assert!(fast.unwrap().unwrap().persisted);

        let persisted = sessions.find_thread(&thread.id).await.unwrap();
        let contents: Vec<_> = persisted.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "slow request",
                "fast request",
                "reply to fast request",
                "reply to slow request",
            ]
        );
        assert_eq!(persisted.messages, exchange.messages().await);
    }

    #[tokio::test]
    async fn test_success_after_failure_persists_visible_history() {
        let generative = ScriptedResponder::ok();
        let search = ScriptedResponder::failing();
        let sessions = Arc::new(SessionManager::in_memory().unwrap());
        let thread = Thread::new();
        sessions.prepend_thread(thread.clone()).await.unwrap();
        let exchange = MessageExchange::new(Arc::clone(&sessions), responders(generative, search));
        exchange.activate(&thread.id).await;

        exchange
            .send("first", Some(&thread.id), ResponderMode::ProductSearch)
            .await
            .unwrap_err();
        exchange
            .send("second", Some(&thread.id), ResponderMode::GenerativeText)
            .await
            .unwrap()
            .unwrap();

        let visible = exchange.messages().await;
        let contents: Vec<_> = visible.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "reply to second"]);

        let persisted = sessions.find_thread(&thread.id).await.unwrap();
        assert_eq!(persisted.messages, visible);

        // survives a switch away and back
        exchange.reset(None).await;
        assert!(exchange.activate(&thread.id).await);
        assert_eq!(exchange.messages().await, visible);
    }

    #[tokio::test]
    async fn test_without_active_thread_nothing_persisted() {
        let (sessions, exchange, thread) = setup(ScriptedResponder::ok()).await;
        exchange.reset(None).await;

        let outcome = exchange
            .send("hello", None, ResponderMode::GenerativeText)
            .await
            .unwrap()
            .unwrap();

        assert!(!outcome.persisted);
        assert_eq!(exchange.messages().await.len(), 2);
        assert!(sessions.find_thread(&thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_not_shown_after_view_switch() {
        let (sessions, exchange, thread) = setup(ScriptedResponder::ok()).await;
        let other = Thread::new();
        sessions.prepend_thread(other.clone()).await.unwrap();

        let task = {
            let exchange = Arc::clone(&exchange);
            let id = thread.id.clone();
            tokio::spawn(async move {
                exchange
                    .send("slow request", Some(&id), ResponderMode::GenerativeText)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        exchange.activate(&other.id).await;

        let outcome = task.await.unwrap().unwrap().unwrap();
        assert!(outcome.persisted);
        assert!(exchange.messages().await.is_empty());
        assert_eq!(sessions.find_thread(&thread.id).await.unwrap().message_count(), 2);
    }

    #[tokio::test]
    async fn test_activate_unknown_thread_clears_view() {
        let (_sessions, exchange, thread) = setup(ScriptedResponder::ok()).await;
        exchange
            .send("hello", Some(&thread.id), ResponderMode::GenerativeText)
            .await
            .unwrap();

        assert!(!exchange.activate("missing").await);
        assert!(exchange.messages().await.is_empty());
        assert_eq!(exchange.view_thread_id().await.as_deref(), Some("missing"));
    }
}
