//! Shared CLI helpers: response printing and the REPL banner.

use colored::Colorize;

use relay_core::stats::Stats;
use relay_core::types::TokenUsage;

/// Print a complete reply to stdout.
pub fn print_response(response: &str) {
    print_reply_header();
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
}

/// Print the speaker line that precedes a reply.
pub fn print_reply_header() {
    println!();
    println!("{}", "Claude".cyan().bold());
}

pub fn print_usage(usage: &TokenUsage) {
    println!("{}", format_usage(usage).dimmed());
    println!();
}

fn format_usage(usage: &TokenUsage) -> String {
    format!(
        "[{} in / {} out / {} total tokens]",
        usage.input(),
        usage.output(),
        usage.total()
    )
}

pub fn print_stats(stats: &Stats) {
    println!();
    println!("  {:<18} {}", "Requests:".bold(), stats.total_requests);
    println!("  {:<18} {}", "Tokens:".bold(), stats.total_tokens);
    println!(
        "  {:<18} {} ({} active)",
        "Sessions:".bold(),
        stats.total_sessions,
        stats.active_sessions
    );
    println!("  {:<18} {:.1}s", "Uptime:".bold(), stats.uptime_seconds);
    if stats.errors.is_empty() {
        println!("  {:<18} {}", "Errors:".bold(), "none".dimmed());
    } else {
        println!("  {}", "Errors:".bold());
        for (kind, count) in &stats.errors {
            println!("    {:<20} {}", kind.as_str(), count.to_string().red());
        }
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner(session_id: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Relay".cyan().bold(), version.dimmed());
    println!("{}", format!("session {session_id}").dimmed());
    println!(
        "{}",
        "Type a message, \"/stats\", \"/reset\", or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder while a whole reply is awaited.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
