//! Product-search responder
//!
//! Queries the product-search service (`GET /search?query=...`) and replies
//! with the product image URLs it found.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::responder::{AssistantPayload, Responder};
use crate::{Error, Result};

/// Assistant text for a product-search reply
pub fn product_reply(query: &str) -> String {
    format!("Here are some products I found for \"{}\"", query)
}

/// Product-search response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub amazon: Option<Vec<String>>,
    #[serde(default)]
    pub flipkart: Option<Vec<String>>,
}

impl SearchResults {
    /// First non-empty bucket in priority order (amazon, then flipkart)
    pub fn into_products(self) -> Vec<String> {
        [self.amazon, self.flipkart]
            .into_iter()
            .flatten()
            .find(|bucket| !bucket.is_empty())
            .unwrap_or_default()
    }
}

/// Responder backed by the product-search HTTP service
pub struct ProductSearchResponder {
    client: Client,
    base_url: String,
}

impl ProductSearchResponder {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http.timeout())
            .build()
            .map_err(Error::Http)?;
        Ok(Self::with_client(client, &config.search.base_url))
    }

    /// Create with custom client (for testing)
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the raw search results for a query
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let url = format!("{}/search", self.base_url);
        debug!("Product search request: {} query={}", url, query);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| Error::ProductSearch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Product search error: {} - {}", status, body);
            return Err(Error::ProductSearch(format!("{}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProductSearch(format!("failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Responder for ProductSearchResponder {
    fn name(&self) -> &str {
        "product-search"
    }

    async fn respond(&self, query: &str) -> Result<AssistantPayload> {
        let products = self.search(query).await?.into_products();
        info!("Product search for {:?}: {} products", query, products.len());
        Ok(AssistantPayload::products(query, products))
    }
}
