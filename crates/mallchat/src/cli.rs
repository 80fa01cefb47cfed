//! CLI (Command Line Interface) mode
//!
//! Provides an interactive chat REPL over the local thread store.
//! Also supports non-interactive execute mode for one-shot exchanges.

use std::io::Write;
use std::sync::Arc;

use mall_core::{
    AuthClient, Config, ConversationController, ExchangeError, Message, MessageExchange,
    ResponderMode, Responders, SessionManager, Thread,
};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/new", "Start a new conversation"),
    ("/chats", "List conversations"),
    ("/switch", "Switch conversation: /switch <id>"),
    ("/mode", "Toggle responder, or set it: /mode [generative|search]"),
    ("/history", "Show messages of the current conversation"),
    ("/login", "Sign in: /login <email> <password>"),
    ("/logout", "Sign out"),
    ("/help", "Show this help"),
    ("/exit", "Quit"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        // 行頭が / の場合のみ候補を表示
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the active responder
struct ColoredPrompt {
    style: Style,
    mode: ResponderMode,
}

impl ColoredPrompt {
    fn new(mode: ResponderMode) -> Self {
        Self {
            style: Color::Cyan.bold(),
            mode,
        }
    }
}

impl Prompt for ColoredPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint(format!("[{}] > ", self.mode)).to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// Parsed slash command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    New,
    Chats,
    Switch(String),
    Mode(Option<ResponderMode>),
    History,
    Login { email: String, password: String },
    Logout,
    Help,
    Exit,
}

/// Parse a `/command`; `None` for ordinary chat input
fn parse_command(input: &str) -> Option<Result<Command, String>> {
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::to_string);

    let command = match name.as_str() {
        "/new" => Ok(Command::New),
        "/chats" | "/list" => Ok(Command::Chats),
        "/switch" => arg
            .map(Command::Switch)
            .ok_or_else(|| "Usage: /switch <id>".to_string()),
        "/mode" => match arg {
            Some(mode) => mode.parse::<ResponderMode>().map(|m| Command::Mode(Some(m))),
            None => Ok(Command::Mode(None)),
        },
        "/history" => Ok(Command::History),
        "/login" => Ok(Command::Login {
            email: arg.unwrap_or_default(),
            password: parts.next().unwrap_or_default().to_string(),
        }),
        "/logout" => Ok(Command::Logout),
        "/help" | "/?" => Ok(Command::Help),
        "/exit" | "/quit" | "/q" => Ok(Command::Exit),
        _ => Err(format!(
            "Unknown command: {}. Type /help for a list of commands.",
            input
        )),
    };
    Some(command)
}

/// Chat session state shared by the REPL and execute mode
struct ChatApp {
    sessions: Arc<SessionManager>,
    controller: ConversationController,
    auth: AuthClient,
}

impl ChatApp {
    async fn new(config: &Config) -> anyhow::Result<Self> {
        let sessions = Arc::new(
            SessionManager::new(&config.storage.db_path)
                .map_err(|e| anyhow::anyhow!("Failed to open chat store: {}", e))?,
        );
        let responders = Responders::from_config(config)
            .map_err(|e| anyhow::anyhow!("Failed to create responders: {}", e))?;
        let exchange = Arc::new(MessageExchange::new(Arc::clone(&sessions), responders));
        let controller = ConversationController::start(
            Arc::clone(&sessions),
            exchange,
            config.responder.default_mode,
        )
        .await;
        let auth = AuthClient::new(config)
            .map_err(|e| anyhow::anyhow!("Failed to create auth client: {}", e))?;

        Ok(Self {
            sessions,
            controller,
            auth,
        })
    }

    /// Active thread, created on demand
    async fn ensure_thread(&mut self) -> anyhow::Result<()> {
        if self.controller.active_thread_id().is_none() {
            self.controller.create_thread().await?;
        }
        Ok(())
    }

    /// Run one exchange with the typing indicator shown while in flight
    async fn send(&mut self, input: &str) -> anyhow::Result<()> {
        self.ensure_thread().await?;

        let indicator = spawn_typing_indicator(self.controller.exchange());
        let result = self.controller.send(input).await;
        indicator.abort();
        clear_typing();

        match result {
            Ok(Some(outcome)) => {
                print_message(&outcome.assistant);
                if !outcome.persisted {
                    warn!("Exchange was not saved to a conversation");
                }
                self.controller.refresh_threads().await;
            }
            Ok(None) => {}
            Err(e) => print_exchange_error(&e),
        }
        Ok(())
    }

    /// Returns `false` when the REPL should stop
    async fn handle_command(&mut self, command: Command) -> anyhow::Result<bool> {
        match command {
            Command::Exit => {
                println!("\n👋 Goodbye!\n");
                return Ok(false);
            }
            Command::New => {
                let thread = self.controller.create_thread().await?;
                println!("\n✅ Started a new conversation ({})\n", short_id(&thread.id));
            }
            Command::Chats => print_threads(
                self.controller.threads(),
                self.controller.active_thread_id(),
            ),
            Command::Switch(prefix) => match self.resolve_thread(&prefix) {
                Some(id) => match self.controller.select_thread(&id).await {
                    Ok(()) => {
                        let messages = self.controller.exchange().messages().await;
                        println!("\n✅ Switched to {} ({} messages)\n", short_id(&id), messages.len());
                        print_history(&messages);
                    }
                    Err(e) => eprintln!("\n❓ {}. Try /chats.\n", e),
                },
                None => eprintln!("\n❓ \"{}\" matches more than one conversation.\n", prefix),
            },
            Command::Mode(None) => {
                let mode = self.controller.toggle_responder();
                println!("\n🔀 Responder: {}\n", mode);
            }
            Command::Mode(Some(mode)) => {
                self.controller.set_responder_mode(mode);
                println!("\n🔀 Responder: {}\n", mode);
            }
            Command::History => {
                let messages = self.controller.exchange().messages().await;
                print_history(&messages);
            }
            Command::Login { email, password } => self.login(&email, &password).await?,
            Command::Logout => self.logout().await?,
            Command::Help => print_help(),
        }
        Ok(true)
    }

    /// Match a full id or a unique id prefix
    fn resolve_thread(&self, prefix: &str) -> Option<String> {
        let threads = self.controller.threads();
        if let Some(thread) = threads.iter().find(|t| t.id == prefix) {
            return Some(thread.id.clone());
        }
        let mut matches = threads.iter().filter(|t| t.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(thread), None) => Some(thread.id.clone()),
            // unknown ids fall through to select_thread, which refreshes first
            (None, _) => Some(prefix.to_string()),
            _ => None,
        }
    }

    async fn login(&mut self, email: &str, password: &str) -> anyhow::Result<()> {
        match self.auth.login(email, password).await {
            Ok(auth) => {
                self.sessions.save_auth(&auth).await?;
                println!("\n✅ Login successful! Welcome, {}.\n", auth.user.display_name());
            }
            Err(e) => eprintln!("\n{}\n", Color::Red.paint(format!("❌ {}", e))),
        }
        Ok(())
    }

    async fn logout(&mut self) -> anyhow::Result<()> {
        match self.sessions.load_auth().await {
            Some(auth) => {
                if let Err(e) = self.auth.logout(&auth.token).await {
                    warn!("Backend logout failed: {}", e);
                }
                self.sessions.clear_auth().await?;
                println!("\n👋 Signed out.\n");
            }
            None => println!("\nNot signed in.\n"),
        }
        Ok(())
    }
}

/// Run CLI interactive mode
pub async fn run_cli(config: Config) -> anyhow::Result<()> {
    let mut app = ChatApp::new(&config).await?;

    info!(
        "Starting CLI mode with {} conversations",
        app.controller.threads().len()
    );

    print_welcome();
    if let Some(auth) = app.sessions.load_auth().await {
        println!("Signed in as {}\n", auth.user.display_name());
    }

    // Setup keybindings
    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(48))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    loop {
        let prompt = ColoredPrompt::new(app.controller.responder_mode());
        let signal = line_editor.read_line(&prompt);

        match signal {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match parse_command(input) {
                    Some(Ok(command)) => {
                        if !app.handle_command(command).await? {
                            break;
                        }
                    }
                    Some(Err(message)) => eprintln!("\n❓ {}\n", message),
                    None => app.send(input).await?,
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\n👋 Goodbye!\n");
                break;
            }
            Err(err) => {
                eprintln!("\n❌ Error: {}\n", err);
                break;
            }
        }
    }

    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

// ============================================================================
// 表示 (Rendering)
// ============================================================================

fn spawn_typing_indicator(exchange: &Arc<MessageExchange>) -> JoinHandle<()> {
    let mut typing = exchange.typing();
    tokio::spawn(async move {
        loop {
            if *typing.borrow_and_update() > 0 {
                print!("{}", Color::DarkGray.paint("🛍  MallChat is typing..."));
            } else {
                clear_typing();
            }
            let _ = std::io::stdout().flush();
            if typing.changed().await.is_err() {
                break;
            }
        }
    })
}

fn clear_typing() {
    print!("\r\x1b[2K");
    let _ = std::io::stdout().flush();
}

fn print_message(message: &Message) {
    if message.is_user() {
        println!("{} {}", Color::Cyan.bold().paint("👤 You:"), message.content);
        return;
    }

    println!("\n{} {}", Color::Purple.bold().paint("🛍  MallChat:"), message.content);
    if let Some(products) = &message.products {
        if products.is_empty() {
            println!("   No products found.");
        }
        for (i, url) in products.iter().enumerate() {
            println!("   {}. {}", i + 1, url);
        }
        if let Some(link) = message.product_link() {
            println!("   {} {}", Style::new().bold().paint("View Details:"), link);
        }
    }
    println!();
}

fn print_exchange_error(error: &ExchangeError) {
    warn!("Error fetching response: {}", error);
    let message = match error {
        ExchangeError::Responder { mode, .. } => {
            format!("❌ The {} responder is unavailable. Please try again.", mode)
        }
        ExchangeError::Persist { .. } => "❌ The reply could not be saved.".to_string(),
    };
    eprintln!("\n{}\n", Color::Red.paint(message));
}

fn print_threads(threads: &[Thread], active: Option<&str>) {
    println!();
    println!("💬 Conversations ({}):", threads.len());
    println!("{}", "─".repeat(60));
    for thread in threads {
        let marker = if Some(thread.id.as_str()) == active { "▶" } else { " " };
        println!(
            "{} {}  {}  ({} messages)",
            marker,
            short_id(&thread.id),
            Style::new().bold().paint(&thread.title),
            thread.message_count()
        );
        println!("    {}", Style::new().dimmed().paint(&thread.last_message));
    }
    println!("{}", "─".repeat(60));
    println!();
}

fn print_history(messages: &[Message]) {
    println!();
    println!("📜 History ({} messages):", messages.len());
    println!("{}", "─".repeat(60));
    for message in messages {
        print_message(message);
    }
    println!("{}", "─".repeat(60));
    println!();
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn print_welcome() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          🛍  MallChat - Product Discovery Assistant         ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Ask about products, styles, recommendations...            ║");
    println!("║  Commands: /new, /chats, /switch, /mode, /help, /exit      ║");
    println!("║  Type / to see command suggestions                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

fn print_help() {
    println!();
    println!("📖 Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {:<10} {}", cmd, desc);
    }
    println!();
    println!("💡 Anything else is sent to the current responder.");
    println!();
}

// ============================================================================
// 非対話モード (Non-interactive mode)
// ============================================================================

/// 非対話モード: 1 回だけ送信して応答を表示
///
/// # 使用例
/// ```bash
/// mallchat --execute "red running shoes"
/// RESPONDER_MODE=generative mallchat -e "what goes with a navy blazer?"
/// ```
pub async fn run_execute(config: Config, prompt: &str) -> anyhow::Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("prompt is empty");
    }

    let mut app = ChatApp::new(&config).await?;
    app.ensure_thread().await?;

    match app.controller.send(prompt).await {
        Ok(Some(outcome)) => {
            print_message(&outcome.assistant);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
