//! Relay CLI: entry point.
//!
//! # Commands
//!
//! - `relay chat [-m MESSAGE] [--stream] [--system TEXT] [--user ID]`: chat
//!   against one session (single-shot or REPL)
//! - `relay init`: write a default config file
//! - `relay status`: show configuration and provider status

mod helpers;
mod init;
mod repl;
mod status;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing::info;

use relay_agent::{AgentManager, RequestOptions, StreamEvent};
use relay_core::config::{get_config_path, load_config, Config, LogFormat, LoggingConfig};
use relay_core::utils::expand_home;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Relay: session-managed conversations with Claude
#[derive(Parser)]
#[command(name = "relay", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.relay/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model (single-shot or interactive REPL)
    Chat(ChatArgs),

    /// Write a default config file
    Init,

    /// Show configuration and provider status
    Status,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Single message (non-interactive). Omit for REPL mode.
    #[arg(short, long)]
    message: Option<String>,

    /// Print the reply as it is generated
    #[arg(long, default_value_t = false)]
    stream: bool,

    /// System prompt for the session
    #[arg(long)]
    system: Option<String>,

    /// Owner id recorded on the session
    #[arg(short, long, default_value = "cli")]
    user: String,

    /// Enable logging at the configured level
    #[arg(long, default_value_t = false)]
    logs: bool,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(get_config_path);

    match cli.command {
        Commands::Chat(args) => {
            let config = load_config(Some(config_path.as_path()));
            init_logging(&config.logging, args.logs);
            run_chat(config, config_path, args).await
        }
        Commands::Init => init::run(&config_path),
        Commands::Status => status::run(&config_path),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(config: Config, config_path: PathBuf, args: ChatArgs) -> Result<()> {
    if !config.provider.is_configured() {
        bail!(
            "no API key configured: set ANTHROPIC_API_KEY or provider.apiKey in {}",
            config_path.display()
        );
    }

    let manager = AgentManager::from_config(&config).context("failed to create provider")?;
    let session_id = manager
        .create_session(&args.user, args.system.clone())
        .await
        .context("failed to create session")?;

    let result = match args.message {
        Some(msg) => {
            info!(session_id = %session_id, "processing single message");
            ask(&manager, &session_id, &msg, args.stream).await
        }
        None => repl::run(&manager, session_id, &args.user, args.system, args.stream).await,
    };

    manager.shutdown().await;
    result
}

/// Send one prompt and print the reply, streamed or whole.
pub async fn ask(manager: &AgentManager, session_id: &str, prompt: &str, stream: bool) -> Result<()> {
    let options = RequestOptions::default();

    if !stream {
        helpers::print_thinking();
        let outcome = manager.process_request(session_id, prompt, &options).await;
        helpers::clear_thinking();
        let outcome = outcome?;
        helpers::print_response(&outcome.content);
        helpers::print_usage(&outcome.usage);
        return Ok(());
    }

    let mut events = manager.stream_response(session_id, prompt, &options).await?;
    helpers::print_reply_header();
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Token { text } => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Done { usage } => {
                println!();
                helpers::print_usage(&usage);
            }
            StreamEvent::Error { kind, message } => {
                println!();
                bail!("{kind}: {message}");
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins when set. Otherwise only warnings are shown unless
/// `verbose`, in which case the configured level applies.
fn init_logging(config: &LoggingConfig, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(&config.level)
        } else {
            EnvFilter::new("warn")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.with_target(false).compact().init(),
    }
}
