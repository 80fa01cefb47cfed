//! Conversation flow
//!
//! The controller selects and creates threads; the exchange runs one
//! user-input/assistant-reply round trip against a responder.

mod controller;
mod exchange;

pub use controller::ConversationController;
pub use exchange::{ExchangeError, ExchangeOutcome, MessageExchange};
