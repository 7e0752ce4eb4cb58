//! `relay init`: write a config file with defaults.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use relay_core::config::{save_config, Config};

/// Run the init command. An existing file is left untouched.
pub fn run(config_path: &Path) -> Result<()> {
    println!();
    println!("{}", "Relay Setup".cyan().bold());
    println!();

    if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        save_config(&Config::default(), Some(config_path))
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    }

    println!();
    println!(
        "{}",
        "Set provider.apiKey there, or export ANTHROPIC_API_KEY, then run `relay chat`.".dimmed()
    );
    println!();

    Ok(())
}
