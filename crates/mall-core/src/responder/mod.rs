//! Responder system
//!
//! A responder turns one user query into the content of one assistant
//! message. Two implementations exist: generative text and product search.

mod generative;
mod product_search;
mod selector;

use async_trait::async_trait;

use crate::Result;

pub use generative::GenerativeTextResponder;
pub use product_search::{ProductSearchResponder, SearchResults, product_reply};
pub use selector::{ResponderMode, ResponderSelector, Responders};

/// Content produced by a responder for one assistant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantPayload {
    pub content: String,
    pub products: Option<Vec<String>>,
    pub query: Option<String>,
    pub response: Option<String>,
}

impl AssistantPayload {
    /// Generative reply: the full text is both content and response
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content: text.clone(),
            products: None,
            query: None,
            response: Some(text),
        }
    }

    /// Product-search reply for `query`
    pub fn products(query: impl Into<String>, products: Vec<String>) -> Self {
        let query = query.into();
        Self {
            content: product_reply(&query),
            products: Some(products),
            query: Some(query),
            response: None,
        }
    }
}

/// External service producing assistant replies
#[async_trait]
pub trait Responder: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Produce the assistant payload for one query
    async fn respond(&self, query: &str) -> Result<AssistantPayload>;
}
