//! Webhook chat - terminal front-end
//!
//! Reads lines from stdin and sends them to the configured webhook, printing
//! conversation updates as they arrive. `/cancel`, `/reset` and `/quit` are
//! handled locally.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook_chat::session::{KeyValueStore, MemoryStore, SqliteStore};
use webhook_chat::{
    ChatConfig, ChatMessage, ChatRuntime, ChatUpdate, ConvContext, Role, SessionStore, Theme,
    TransportClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ChatConfig::from_env()?;
    let sessions = SessionStore::new(open_store(&config.storage_path));
    let transport = TransportClient::from_config(&config);

    let (runtime, handle) = ChatRuntime::new(ConvContext::default(), sessions, transport);
    let runtime_task = tokio::spawn(runtime.run());

    let mut updates = handle.subscribe();
    let mut display = Display::new(config.theme);
    for message in &handle.snapshot().await?.messages {
        display.print_message(message);
    }

    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => display.render(&update),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind the conversation");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/cancel" => handle.cancel().await?,
            "/reset" => handle.reset().await?,
            _ => handle.send(line).await?,
        }
    }

    drop(handle);
    runtime_task.await?;
    printer.await?;
    Ok(())
}

fn open_store(path: &Path) -> Arc<dyn KeyValueStore> {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "Failed to create storage directory");
        }
    }

    match SqliteStore::open(path) {
        Ok(store) => {
            tracing::info!(path = %path.display(), "Opened chat storage");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Storage unavailable, history will not survive this run"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

struct Palette {
    user: &'static str,
    bot: &'static str,
    error: &'static str,
    dim: &'static str,
}

const RESET: &str = "\x1b[0m";

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                user: "\x1b[1;36m",
                bot: "\x1b[0;37m",
                error: "\x1b[1;31m",
                dim: "\x1b[2;37m",
            },
            Theme::Light => Self {
                user: "\x1b[1;34m",
                bot: "\x1b[0;30m",
                error: "\x1b[0;31m",
                dim: "\x1b[2;30m",
            },
        }
    }
}

/// Renders updates to stdout, printing streamed drafts incrementally
struct Display {
    palette: Palette,
    /// Draft being streamed and how many bytes of it are on screen
    open_draft: Option<(String, usize)>,
}

impl Display {
    fn new(theme: Theme) -> Self {
        Self {
            palette: Palette::for_theme(theme),
            open_draft: None,
        }
    }

    fn print_message(&self, message: &ChatMessage) {
        println!("{}", self.line(message));
    }

    fn line(&self, message: &ChatMessage) -> String {
        let (color, label) = match message.role {
            _ if message.is_error => (self.palette.error, "error"),
            Role::User => (self.palette.user, "you"),
            Role::Bot => (self.palette.bot, "bot"),
            Role::System => (self.palette.dim, "system"),
        };
        format!("{color}{label}>{RESET} {}", message.text)
    }

    fn render(&mut self, update: &ChatUpdate) {
        match update {
            ChatUpdate::MessageAppended(message) if message.role == Role::Bot => {
                self.close_draft();
                print!("{}", self.line(message));
                self.open_draft = Some((message.id.clone(), message.text.len()));
            }
            ChatUpdate::MessageAppended(message) => {
                self.close_draft();
                self.print_message(message);
            }
            ChatUpdate::MessageUpdated(message) => match &mut self.open_draft {
                Some((id, shown)) if *id == message.id => {
                    if let Some(rest) = message.text.get(*shown..) {
                        print!("{rest}");
                    }
                    *shown = message.text.len();
                }
                _ => {
                    self.close_draft();
                    self.print_message(message);
                }
            },
            ChatUpdate::MessageRemoved { .. } => {
                self.close_draft();
                println!("{}(partial reply discarded){RESET}", self.palette.dim);
            }
            ChatUpdate::PendingChanged(true) => {
                println!("{}...{RESET}", self.palette.dim);
            }
            ChatUpdate::PendingChanged(false) => self.close_draft(),
            ChatUpdate::HistoryCleared { session_id } => {
                self.close_draft();
                println!("{}(new session {session_id}){RESET}", self.palette.dim);
            }
        }
        let _ = std::io::stdout().flush();
    }

    fn close_draft(&mut self) {
        if self.open_draft.take().is_some() {
            println!();
        }
    }
}
