//! mall-core: MallChat Core Library
//!
//! ショッピングアシスタントのコア機能を提供します。
//! Thread/Message のデータモデル、ローカル永続化ストア、会話コントローラー、
//! 外部レスポンダー (生成 AI / 商品検索) との通信を含みます。

pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod responder;
pub mod session;

pub use auth::{AuthClient, AuthData, AuthUser};
pub use config::{
    ApiConfig, Config, HttpConfig, LlmConfig, LlmProvider, ResponderConfig, SearchConfig,
    StorageConfig,
};
pub use conversation::{ConversationController, ExchangeError, ExchangeOutcome, MessageExchange};
pub use error::{Error, Result};
pub use llm::GenerativeClient;
pub use responder::{
    AssistantPayload, GenerativeTextResponder, ProductSearchResponder, Responder, ResponderMode,
    ResponderSelector, Responders,
};
pub use session::{Message, Sender, SessionManager, SessionStore, Thread};
