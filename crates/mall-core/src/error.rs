//! Error types for mall-core

use thiserror::Error;

/// Main error type for mall-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Generative API error: {0}")]
    Llm(String),

    #[error("Product search error: {0}")]
    ProductSearch(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("{0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for mall-core
pub type Result<T> = std::result::Result<T, Error>;
