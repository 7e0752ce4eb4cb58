//! Interactive REPL over a single session.
//!
//! Uses `rustyline` for readline-style editing with persistent history.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::{debug, info};

use relay_agent::AgentManager;
use relay_core::error::AgentError;
use relay_core::utils::{get_data_path, truncate_string};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// A line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Exit,
    Stats,
    Reset,
    Message(&'a str),
}

fn parse_input(line: &str) -> Option<Input<'_>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if EXIT_COMMANDS.contains(&lower.as_str()) {
        return Some(Input::Exit);
    }
    Some(match lower.as_str() {
        "/stats" => Input::Stats,
        "/reset" => Input::Reset,
        _ => Input::Message(trimmed),
    })
}

/// Run the interactive REPL loop.
///
/// `/reset` replaces the session with a fresh one owned by the same user.
pub async fn run(
    manager: &AgentManager,
    mut session_id: String,
    user_id: &str,
    system_prompt: Option<String>,
    stream: bool,
) -> Result<()> {
    helpers::print_banner(&session_id);

    let mut editor = create_editor()?;

    loop {
        let line = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => {
                // Ctrl-C
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                // Ctrl-D
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let Some(input) = parse_input(&line) else {
            continue;
        };

        let _ = editor.add_history_entry(line.as_str());

        match input {
            Input::Exit => {
                println!("\nGoodbye!");
                break;
            }
            Input::Stats => helpers::print_stats(&manager.get_stats().await),
            Input::Reset => {
                manager.delete_session(&session_id).await;
                match manager.create_session(user_id, system_prompt.clone()).await {
                    Ok(new_id) => {
                        info!(old = %session_id, new = %new_id, "session reset");
                        session_id = new_id;
                        println!("\nStarted a new session {session_id}\n");
                    }
                    Err(e) => {
                        eprintln!("\n❌ Error: {e}\n");
                        break;
                    }
                }
            }
            Input::Message(prompt) => {
                debug!(
                    session_id = %session_id,
                    input = %truncate_string(prompt, 80),
                    "processing input"
                );
                match ensure_session(manager, &mut session_id, user_id, system_prompt.clone()).await {
                    Ok(true) => println!("\nSession expired, started a new session {session_id}\n"),
                    Ok(false) => {}
                    Err(e) => {
                        eprintln!("\n❌ Error: {e}\n");
                        continue;
                    }
                }
                if let Err(e) = crate::ask(manager, &session_id, prompt, stream).await {
                    eprintln!("\n❌ Error: {e}\n");
                }
            }
        }
    }

    save_history(&mut editor);

    Ok(())
}

/// Replace `session_id` with a fresh session if it has been reaped.
///
/// Returns whether a new session was created.
async fn ensure_session(
    manager: &AgentManager,
    session_id: &mut String,
    user_id: &str,
    system_prompt: Option<String>,
) -> Result<bool, AgentError> {
    if manager.session(session_id).await.is_some() {
        return Ok(false);
    }
    let new_id = manager.create_session(user_id, system_prompt).await?;
    info!(old = %session_id, new = %new_id, "session expired, recreated");
    *session_id = new_id;
    Ok(true)
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    get_data_path().join("history").join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
