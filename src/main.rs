//! stomp-chat CLI - terminal chat client for a STOMP broker.
//!
//! This is the main binary entry point. See the `stomp_chat` library
//! for the core functionality.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stomp_chat::chat::{InboundMessage, TypingEvent};
use stomp_chat::constants::user_routing_key;
use stomp_chat::{
    ChatConfig, ChatError, ChatHandler, ChatMessage, ChatSession, ConnectionEvent, WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

// CLI
#[derive(Parser)]
#[command(name = "stomp-chat")]
#[command(version)]
#[command(about = "Chat over STOMP on WebSocket")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and chat interactively
    Chat {
        /// Local user id (overrides userId from config)
        #[arg(long)]
        user: Option<String>,
        /// Initial recipient user id
        #[arg(long)]
        to: Option<String>,
    },
    /// Print the effective configuration (passcode masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chat { user, to } => {
            if let Some(user) = user {
                config.user_id = user;
            }
            run_chat(&config, to).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

/// Log to stderr, or to `STOMP_CHAT_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("STOMP_CHAT_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ChatConfig> {
    match path {
        Some(path) => {
            let mut config = ChatConfig::load_from(path)?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => ChatConfig::load(),
    }
}

/// Prints inbound traffic to the terminal.
struct ConsolePrinter;

impl ChatHandler for ConsolePrinter {
    fn on_connect(&mut self) {
        println!("* connected");
    }

    fn on_message(&mut self, message: InboundMessage) {
        match message.message {
            Some(chat) => println!("[{}] {}", chat.from, chat.content),
            None => println!("[?] {}", message.raw),
        }
    }

    fn on_typing_status(&mut self, status: TypingEvent) {
        if let Some(status) = status.status.filter(|s| s.is_typing) {
            println!("* {} is typing...", status.from);
        }
    }

    fn on_error(&mut self, error: ChatError) {
        eprintln!("! {error}");
    }

    fn on_connection_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Disconnected { code, reason } => {
                eprintln!("* connection lost ({code} {reason})");
            }
            ConnectionEvent::Reconnecting {
                attempt,
                next_attempt_in,
            } => {
                eprintln!(
                    "* reconnecting in {}ms (attempt {attempt})",
                    next_attempt_in.as_millis()
                );
            }
            ConnectionEvent::Connected | ConnectionEvent::Error(_) => {}
        }
    }
}

/// Result of one `select!` round in [`run_chat`].
enum Step {
    Event(Option<stomp_chat::stomp::SessionEvent>),
    Line(std::io::Result<Option<String>>),
    Interrupt,
}

async fn run_chat(config: &ChatConfig, to: Option<String>) -> Result<()> {
    let connector = WsConnector::new().with_header("Sec-WebSocket-Protocol", "v12.stomp");
    let mut session = ChatSession::new(config, Arc::new(connector))?;
    session.connect()?;

    println!(
        "* {} on {} (commands: /to <id>, /typing, /quit)",
        session.user_id(),
        config.url
    );

    let mut printer = ConsolePrinter;
    let mut peer = to;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let step = tokio::select! {
            event = session.next_event() => Step::Event(event),
            line = lines.next_line() => Step::Line(line),
            _ = &mut ctrl_c => Step::Interrupt,
        };

        match step {
            Step::Event(Some(event)) => session.dispatch(event, &mut printer).await,
            Step::Event(None) => break,
            Step::Line(Ok(Some(line))) => {
                if !handle_line(&mut session, &mut peer, line.trim()).await {
                    break;
                }
            }
            Step::Line(Ok(None)) | Step::Interrupt => break,
            Step::Line(Err(e)) => {
                log::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }

    session.disconnect().await;
    println!("* bye");
    Ok(())
}

/// Handle one input line. Returns `false` to quit.
async fn handle_line(session: &mut ChatSession, peer: &mut Option<String>, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    if line == "/quit" {
        return false;
    }

    if let Some(id) = line.strip_prefix("/to ") {
        let id = id.trim();
        if id.is_empty() {
            eprintln!("! usage: /to <user id>");
        } else {
            *peer = Some(id.to_string());
            println!("* talking to {id}");
        }
        return true;
    }

    let Some(to) = peer.clone() else {
        eprintln!("! pick a recipient first: /to <user id>");
        return true;
    };

    let result = if line == "/typing" {
        session.publish_typing_status(true, &to).await
    } else {
        let message = ChatMessage::direct(session.user_id(), to.as_str(), line);
        session.publish(&message, &user_routing_key(&to)).await
    };

    if let Err(e) = result {
        eprintln!("! {e}");
    }
    true
}
