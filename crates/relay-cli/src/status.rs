//! `relay status`: show configuration and provider status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use relay_agent::RetryPolicy;
use relay_core::config::load_config;
use relay_providers::AnthropicProvider;

/// Run the status command.
pub fn run(config_path: &Path) -> Result<()> {
    let config = load_config(Some(config_path));

    println!();
    println!("{}", "Relay Status".cyan().bold());
    println!();

    // Config
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    // Provider
    let provider = &config.provider;
    let api_base = provider
        .api_base
        .as_deref()
        .unwrap_or(AnthropicProvider::DEFAULT_API_BASE);
    println!("  {:<18} {}", "Model:".bold(), provider.model);
    println!("  {:<18} {}", "API base:".bold(), api_base);
    let key_status = if provider.is_configured() {
        format!("{} (key set)", "✓".green())
    } else {
        format!("{}", "· not configured".dimmed())
    };
    println!("  {:<18} {}", "API key:".bold(), key_status);
    println!("  {:<18} {}s", "Timeout:".bold(), provider.timeout_secs);

    // Request defaults
    println!(
        "  {:<18} {} | max_tokens: {}",
        "Parameters:".bold(),
        format!("temp: {}", config.defaults.temperature).dimmed(),
        format!("{}", config.defaults.max_tokens).dimmed(),
    );

    // Sessions
    println!();
    println!("  {}", "Sessions:".bold());
    let sessions = &config.sessions;
    println!("    {:<20} {}", "Max concurrent", sessions.max_sessions);
    println!("    {:<20} {}s", "Idle timeout", sessions.idle_timeout_secs);
    println!("    {:<20} {}s", "Reap interval", sessions.reap_interval_secs);

    // Retry
    println!();
    let policy = RetryPolicy::from_config(&config.retry);
    let delays: Vec<String> = (1..policy.max_attempts())
        .map(|n| format!("{:.1}s", policy.delay_for_attempt(n).as_secs_f64()))
        .collect();
    println!(
        "  {:<18} {} attempts {}",
        "Retry:".bold(),
        policy.max_attempts(),
        if delays.is_empty() {
            String::new()
        } else {
            format!("(backoff {})", delays.join(", ")).dimmed().to_string()
        }
    );

    // Logging
    println!(
        "  {:<18} {} ({:?})",
        "Logging:".bold(),
        config.logging.level,
        config.logging.format
    );

    println!();

    Ok(())
}
