//! Generative API HTTP Client
//!
//! Supports Gemini, OpenAI-compatible and Claude APIs for single-prompt
//! text generation.

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{Config, LlmProvider};
use crate::error::{Error, Result};

use super::types::*;

/// Generative-text API client
#[derive(Clone)]
pub struct GenerativeClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: LlmProvider,
}

impl GenerativeClient {
    /// Create a new client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http.timeout())
            .build()
            .map_err(Error::Http)?;

        let llm_config = &config.llm;
        let base_url = llm_config
            .base_url
            .clone()
            .unwrap_or_else(|| llm_config.provider.default_base_url().to_string());

        Ok(Self {
            client,
            api_key: llm_config.api_key.clone(),
            model: llm_config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            provider: llm_config.provider.clone(),
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Generate a reply for a single prompt
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::Gemini => self.send_gemini_request(prompt).await,
            LlmProvider::OpenAi => self.send_openai_request(prompt).await,
            LlmProvider::Claude => self.send_claude_request(prompt).await,
        }
    }

    async fn send_gemini_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("Sending request to Gemini API: {}", url);

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GeminiRequest::prompt(prompt));

        let parsed: GeminiResponse = self.execute(request).await?;
        let text = parsed
            .text()
            .ok_or_else(|| Error::Llm("Response contained no candidates".to_string()))?;

        info!(
            "Gemini API response: finish_reason={:?}, chars={}",
            parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            text.len()
        );
        Ok(text)
    }

    async fn send_openai_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending request to OpenAI-compatible API: {}", url);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionRequest::prompt(&self.model, prompt));

        let parsed: ChatCompletionResponse = self.execute(request).await?;
        let text = parsed
            .text()
            .ok_or_else(|| Error::Llm("Response contained no choices".to_string()))?;

        info!("OpenAI API response: chars={}", text.len());
        Ok(text)
    }

    async fn send_claude_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        debug!("Sending request to Claude API: {}", url);

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&ClaudeRequest::prompt(&self.model, prompt));

        let parsed: ClaudeResponse = self.execute(request).await?;
        let text = parsed
            .text()
            .ok_or_else(|| Error::Llm("Response contained no text".to_string()))?;

        info!(
            "Claude API response: stop_reason={:?}, chars={}",
            parsed.stop_reason,
            text.len()
        );
        Ok(text)
    }

    /// Send a request and decode a successful JSON body
    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Generative API error: {} - {}", status, body);
            return Err(Error::Llm(format!("{}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Llm(format!("Failed to parse response: {} - {}", e, body)))
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the provider type
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }
}
