//! Generative-text responder

use async_trait::async_trait;

use crate::llm::GenerativeClient;
use crate::responder::{AssistantPayload, Responder};
use crate::Result;

/// Sends the user's text as a prompt and replies with the generated text
pub struct GenerativeTextResponder {
    client: GenerativeClient,
}

impl GenerativeTextResponder {
    pub fn new(client: GenerativeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Responder for GenerativeTextResponder {
    fn name(&self) -> &str {
        "generative"
    }

    async fn respond(&self, query: &str) -> Result<AssistantPayload> {
        let text = self.client.generate(query).await?;
        Ok(AssistantPayload::text(text))
    }
}
