//! mallchat: MallChat Main Binary
//!
//! Main entry point for the MallChat shopping assistant.
//!
//! Usage:
//!   mallchat                 - Start server mode (backend HTTP API)
//!   mallchat --cli           - Start interactive chat
//!   mallchat --execute TEXT  - Run one exchange and print the reply
//!   mallchat --help          - Show help

mod cli;

use mall_core::Config;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// Server mode (backend HTTP API)
    Server,
    /// Interactive CLI mode
    Cli,
    /// One-shot exchange
    Execute(String),
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let mode = parse_args(std::env::args().skip(1));

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("mallchat {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Interactive modes keep the terminal quiet unless RUST_LOG says otherwise
    let default_level = match mode {
        RunMode::Server => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting mallchat...");
    tracing::info!(
        "Model: {} ({:?}), default responder: {}",
        config.llm.model,
        config.llm.provider,
        config.responder.default_mode
    );

    match mode {
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(config).await
        }
        RunMode::Execute(prompt) => cli::run_execute(config, &prompt).await,
        RunMode::Server => run_server(config).await,
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> RunMode {
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server" | "-s" => return RunMode::Server,
            "--cli" | "-c" => return RunMode::Cli,
            "--execute" | "-e" => {
                let prompt: Vec<String> = args.collect();
                return RunMode::Execute(prompt.join(" "));
            }
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("mallchat - MallChat shopping assistant");
    println!();
    println!("Usage:");
    println!("  mallchat                  Start server mode (backend HTTP API)");
    println!("  mallchat --server         Same as above");
    println!("  mallchat --cli            Start interactive chat");
    println!("  mallchat --execute TEXT   Send one message and print the reply");
    println!("  mallchat --help           Show this help message");
    println!("  mallchat --version        Show version");
    println!();
    println!("Environment Variables:");
    println!("  GEMINI_API_KEY       Generative text API key");
    println!("  LLM_PROVIDER         gemini, openai or claude (default: gemini)");
    println!("  LLM_MODEL            Model name (default: gemini-1.5-flash)");
    println!("  LLM_BASE_URL         Custom API endpoint");
    println!("  PRODUCT_SEARCH_URL   Product-search service base URL");
    println!("  RESPONDER_MODE       generative or search (default: search)");
    println!("  PORT                 Backend port (default: 5000)");
    println!("  API_ALLOWED_ORIGINS  Comma-separated CORS origins (default: any)");
    println!("  BACKEND_URL          Backend URL used by the CLI login");
    println!("  DB_PATH              Local chat store (default: data/mallchat.db)");
    println!("  DATABASE_PATH        Backend database (default: data/mallchat-server.db)");
}

/// Run server mode (backend HTTP API)
async fn run_server(config: Config) -> anyhow::Result<()> {
    let port = config.api.port;
    let mut server = tokio::spawn(mall_api::start_server(config));
    tracing::info!("HTTP API server starting on port {}", port);
    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down...");
            server.abort();
        }
        joined = &mut server => {
            if let Err(e) = joined? {
                tracing::error!("HTTP API error: {}", e);
                return Err(e);
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
