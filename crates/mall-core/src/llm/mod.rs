//! Generative API client and types
//!
//! Supports Gemini, OpenAI-compatible and Claude APIs.

mod client;
mod types;

pub use client::GenerativeClient;
pub use types::*;
