//! Thread and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::responder::AssistantPayload;

/// Default title for a freshly created thread
pub const DEFAULT_THREAD_TITLE: &str = "New Conversation";

/// Default preview text for a thread without messages
pub const DEFAULT_THREAD_PREVIEW: &str = "Start a new product discovery conversation";

const PREVIEW_CHARS: usize = 80;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One turn in a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Product image URLs (product-search replies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<String>>,
    /// Query used to build product links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Full generative-text reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Message {
    /// Create a user message. The typed text doubles as the query.
    pub fn user(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: new_id(),
            query: Some(content.clone()),
            content,
            sender: Sender::User,
            timestamp: Utc::now(),
            products: None,
            response: None,
        }
    }

    /// Create an assistant message from a responder payload
    pub fn assistant(payload: AssistantPayload) -> Self {
        Self {
            id: new_id(),
            content: payload.content,
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            products: payload.products,
            query: payload.query,
            response: payload.response,
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    /// "View details" link for product results
    pub fn product_link(&self) -> Option<String> {
        self.query
            .as_deref()
            .filter(|_| self.products.is_some())
            .map(product_search_link)
    }
}

/// Retail search link for a query, spaces joined with `+`
pub fn product_search_link(query: &str) -> String {
    format!("https://www.amazon.in/s?k={}", query.trim().replace(' ', "+"))
}

/// A named, ordered conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    /// Create an empty thread with the default title and preview
    pub fn new() -> Self {
        Self::with_title(DEFAULT_THREAD_TITLE)
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            last_message: DEFAULT_THREAD_PREVIEW.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            messages: Vec::new(),
        }
    }

    /// Append messages in order and refresh the preview
    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        if let Some(last) = self.messages.last() {
            self.last_message = preview(&last.content);
            self.timestamp = last.timestamp.to_rfc3339();
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default().trim();
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
