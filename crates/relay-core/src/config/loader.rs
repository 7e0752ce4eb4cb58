//! Config loader: reads `~/.relay/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.relay/config.json`
//! 3. Environment variables `RELAY_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use super::schema::{Config, LogFormat};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    apply_env_overrides(load_config_from_path(&config_path))
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `RELAY_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `RELAY_PROVIDER__API_KEY` (falls back to `ANTHROPIC_API_KEY`)
/// - `RELAY_PROVIDER__API_BASE`, `RELAY_PROVIDER__MODEL`, `RELAY_PROVIDER__TIMEOUT_SECS`
/// - `RELAY_SESSIONS__MAX_SESSIONS`, `RELAY_SESSIONS__IDLE_TIMEOUT_SECS`,
///   `RELAY_SESSIONS__REAP_INTERVAL_SECS`
/// - `RELAY_RETRY__MAX_ATTEMPTS`, `RELAY_RETRY__MULTIPLIER_MS`, `RELAY_RETRY__MIN_BACKOFF_MS`,
///   `RELAY_RETRY__MAX_BACKOFF_MS`
/// - `RELAY_DEFAULTS__MAX_TOKENS`, `RELAY_DEFAULTS__TEMPERATURE`, `RELAY_DEFAULTS__SYSTEM_PROMPT`
/// - `RELAY_LOGGING__LEVEL`, `RELAY_LOGGING__FORMAT`
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    // Provider
    if let Some(val) = var("RELAY_PROVIDER__API_KEY").or_else(|| var("ANTHROPIC_API_KEY")) {
        config.provider.api_key = val;
    }
    if let Some(val) = var("RELAY_PROVIDER__API_BASE") {
        config.provider.api_base = Some(val);
    }
    if let Some(val) = var("RELAY_PROVIDER__MODEL") {
        config.provider.model = val;
    }
    parse_into(&var, "RELAY_PROVIDER__TIMEOUT_SECS", &mut config.provider.timeout_secs);

    // Sessions
    parse_into(&var, "RELAY_SESSIONS__MAX_SESSIONS", &mut config.sessions.max_sessions);
    parse_into(
        &var,
        "RELAY_SESSIONS__IDLE_TIMEOUT_SECS",
        &mut config.sessions.idle_timeout_secs,
    );
    parse_into(
        &var,
        "RELAY_SESSIONS__REAP_INTERVAL_SECS",
        &mut config.sessions.reap_interval_secs,
    );

    // Retry
    parse_into(&var, "RELAY_RETRY__MAX_ATTEMPTS", &mut config.retry.max_attempts);
    parse_into(&var, "RELAY_RETRY__MULTIPLIER_MS", &mut config.retry.multiplier_ms);
    parse_into(&var, "RELAY_RETRY__MIN_BACKOFF_MS", &mut config.retry.min_backoff_ms);
    parse_into(&var, "RELAY_RETRY__MAX_BACKOFF_MS", &mut config.retry.max_backoff_ms);

    // Request defaults
    parse_into(&var, "RELAY_DEFAULTS__MAX_TOKENS", &mut config.defaults.max_tokens);
    parse_into(&var, "RELAY_DEFAULTS__TEMPERATURE", &mut config.defaults.temperature);
    if let Some(val) = var("RELAY_DEFAULTS__SYSTEM_PROMPT") {
        config.defaults.system_prompt = val;
    }

    // Logging
    if let Some(val) = var("RELAY_LOGGING__LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = var("RELAY_LOGGING__FORMAT") {
        match val.to_lowercase().as_str() {
            "json" => config.logging.format = LogFormat::Json,
            "compact" => config.logging.format = LogFormat::Compact,
            other => warn!("Ignoring unknown log format '{}'", other),
        }
    }

    config
}

/// Parse `key` into `target`, leaving it untouched if unset or invalid.
fn parse_into<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(val) = var(key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring invalid value for {}: {}", key, val),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
