//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. mallchat.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::responder::ResponderMode;
use crate::Error;

/// Generative API provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini generateContent API
    #[default]
    Gemini,
    /// OpenAI-compatible chat completions API
    OpenAi,
    /// Anthropic Claude messages API
    Claude,
}

impl LlmProvider {
    /// プロバイダー名の文字列を解釈する（不明な値は Gemini）
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" | "glm" | "openrouter" => LlmProvider::OpenAi,
            "claude" | "anthropic" => LlmProvider::Claude,
            _ => LlmProvider::Gemini,
        }
    }

    /// Default API endpoint for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Claude => "https://api.anthropic.com/v1",
        }
    }
}

/// Generative-text responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::Gemini,
            base_url: None,
        }
    }
}

/// Product-search responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the product-search service (the `/search` path is appended)
    #[serde(default = "default_search_url")]
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponderConfig {
    /// Responder used for new exchanges until toggled
    #[serde(default)]
    pub default_mode: ResponderMode,
}

/// Backend HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port for the HTTP server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins. `None` allows every origin.
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,

    /// Backend URL used by the chat client for login
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            allowed_origins: None,
            backend_url: default_backend_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local store for the chat client (threads + saved login)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Database for the backend service (users, tokens, chats)
    #[serde(default = "default_server_db_path")]
    pub server_db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            server_db_path: default_server_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Main configuration for mallchat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub responder: ResponderConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_search_url() -> String {
    "https://e-commerence-product-search.onrender.com".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_db_path() -> String {
    "data/mallchat.db".to_string()
}

fn default_server_db_path() -> String {
    "data/mallchat-server.db".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換され、
    /// その後、環境変数による上書きが適用されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// TOML 文字列から設定を構築する（環境変数の上書きは行わない）
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(toml))
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./mallchat.toml` があればそれを使い、なければ環境変数のみ。
    pub fn load() -> crate::Result<Self> {
        if Path::new("mallchat.toml").exists() {
            return Self::from_toml_file("mallchat.toml");
        }

        Ok(Self::from_env())
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// TOML 構造から Config を構築
    fn from_toml_config(toml: TomlConfig) -> Self {
        let llm = toml.llm.unwrap_or_default();
        let llm_config = LlmConfig {
            api_key: llm.api_key.unwrap_or_default(),
            model: llm.model.unwrap_or_else(default_model),
            provider: llm
                .provider
                .map(|p| LlmProvider::from_name(&p))
                .unwrap_or_default(),
            base_url: llm.base_url.filter(|u| !u.is_empty()),
        };

        let search = toml.search.unwrap_or_default();
        let search_config = SearchConfig {
            base_url: search.base_url.unwrap_or_else(default_search_url),
        };

        let responder = toml.responder.unwrap_or_default();
        let responder_config = ResponderConfig {
            default_mode: responder
                .default_mode
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
        };

        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            port: api.port.unwrap_or_else(default_api_port),
            allowed_origins: api.allowed_origins,
            backend_url: api.backend_url.unwrap_or_else(default_backend_url),
        };

        let storage = toml.storage.unwrap_or_default();
        let storage_config = StorageConfig {
            db_path: storage.db_path.unwrap_or_else(default_db_path),
            server_db_path: storage.server_db_path.unwrap_or_else(default_server_db_path),
        };

        let http = toml.http.unwrap_or_default();
        let http_config = HttpConfig {
            timeout_secs: http.timeout_secs.unwrap_or_else(default_timeout_secs),
        };

        Config {
            llm: llm_config,
            search: search_config,
            responder: responder_config,
            api: api_config,
            storage: storage_config,
            http: http_config,
        }
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        // 生成 AI 設定の上書き
        if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(api_key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.is_empty() {
                self.llm.model = model;
            }
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            if !provider.is_empty() {
                self.llm.provider = LlmProvider::from_name(&provider);
            }
        }
        if let Ok(base_url) = std::env::var("LLM_BASE_URL") {
            if !base_url.is_empty() {
                self.llm.base_url = Some(base_url);
            }
        }

        // 商品検索・レスポンダー設定の上書き
        if let Ok(url) = std::env::var("PRODUCT_SEARCH_URL") {
            if !url.is_empty() {
                self.search.base_url = url;
            }
        }
        if let Ok(mode) = std::env::var("RESPONDER_MODE") {
            match mode.parse() {
                Ok(mode) => self.responder.default_mode = mode,
                Err(e) => tracing::warn!("Ignoring RESPONDER_MODE: {}", e),
            }
        }

        // API 設定の上書き（PORT は API_PORT より優先）
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(origins) = std::env::var("API_ALLOWED_ORIGINS") {
            let origins = split_list(&origins);
            self.api.allowed_origins = if origins.is_empty() { None } else { Some(origins) };
        }
        if let Ok(url) = std::env::var("BACKEND_URL") {
            if !url.is_empty() {
                self.api.backend_url = url;
            }
        }

        // ストレージ設定の上書き
        if let Ok(path) = std::env::var("DB_PATH") {
            self.storage.db_path = path;
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.storage.server_db_path = path;
        }

        if let Ok(secs) = std::env::var("HTTP_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.http.timeout_secs = s;
            }
        }
    }
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

/// TOML ファイル用のトップレベル構造
#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    search: Option<TomlSearchConfig>,
    responder: Option<TomlResponderConfig>,
    api: Option<TomlApiConfig>,
    storage: Option<TomlStorageConfig>,
    http: Option<TomlHttpConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    /// API プロバイダー ("gemini", "openai", "claude")
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSearchConfig {
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlResponderConfig {
    /// "generative" または "search"
    #[serde(default)]
    default_mode: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    allowed_origins: Option<Vec<String>>,
    #[serde(default)]
    backend_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlStorageConfig {
    #[serde(default)]
    db_path: Option<String>,
    #[serde(default)]
    server_db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlHttpConfig {
    #[serde(default)]
    timeout_secs: Option<u64>,
}
