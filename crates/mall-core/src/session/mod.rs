//! Session management module
//!
//! Provides the thread/message model and local persistence of conversation
//! history.

mod manager;
mod store;
mod types;

pub use manager::SessionManager;
pub use store::{AUTH_KEY, CHATS_KEY, SessionStore};
pub use types::{
    DEFAULT_THREAD_PREVIEW, DEFAULT_THREAD_TITLE, Message, Sender, Thread, product_search_link,
};
