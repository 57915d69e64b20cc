//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `FINTRACK_DB_PATH`: Database file path
//! - `FINTRACK_REMOTE_URL`: Base URL of the remote API (with `/api`)
//!
//! Optional (defaults apply when unset):
//! - `FINTRACK_DB_POOL_SIZE`
//! - `FINTRACK_PROBE_INTERVAL_SECS`, `FINTRACK_PROBE_TIMEOUT_SECS`
//! - `FINTRACK_CONNECT_TIMEOUT_SECS`, `FINTRACK_REQUEST_TIMEOUT_SECS`
//! - `FINTRACK_SYNC_MAX_RETRIES`
//! - `FINTRACK_SESSION_TTL_SECS`, `FINTRACK_SESSION_SWEEP_SECS`
//! - `FINTRACK_SERVER_ADDR`, `FINTRACK_IDEMPOTENCY_TTL_SECS`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./fintrack.json` or `./fintrack.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fintrack_domain::{Config, FinTrackError, Result};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `FinTrackError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Like [`load`], but falls back to built-in defaults when neither the
/// environment nor a config file provides one.
///
/// A config file that exists but does not parse is still an error.
pub fn load_or_default() -> Result<Config> {
    match load() {
        Ok(config) => Ok(config),
        Err(e) if probe_config_paths().is_none() => {
            tracing::warn!(error = %e, "No configuration found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e),
    }
}

/// Load configuration from environment variables
///
/// `FINTRACK_DB_PATH` and `FINTRACK_REMOTE_URL` must be present; every
/// other variable falls back to its default.
///
/// # Errors
/// Returns `FinTrackError::Config` if required variables are missing
/// or any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("FINTRACK_DB_PATH")?;
    config.remote.base_url = env_var("FINTRACK_REMOTE_URL")?;

    if let Some(pool_size) = env_parse("FINTRACK_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    if let Some(secs) = env_parse("FINTRACK_PROBE_INTERVAL_SECS")? {
        config.connectivity.probe_interval_secs = secs;
    }
    if let Some(secs) = env_parse("FINTRACK_PROBE_TIMEOUT_SECS")? {
        config.connectivity.probe_timeout_secs = secs;
    }
    if let Some(secs) = env_parse("FINTRACK_CONNECT_TIMEOUT_SECS")? {
        config.remote.connect_timeout_secs = secs;
    }
    if let Some(secs) = env_parse("FINTRACK_REQUEST_TIMEOUT_SECS")? {
        config.remote.request_timeout_secs = secs;
    }
    if let Some(retries) = env_parse("FINTRACK_SYNC_MAX_RETRIES")? {
        config.sync.max_retries = retries;
    }
    if let Some(secs) = env_parse("FINTRACK_SESSION_TTL_SECS")? {
        config.session.ttl_secs = secs;
    }
    if let Some(secs) = env_parse("FINTRACK_SESSION_SWEEP_SECS")? {
        config.session.sweep_interval_secs = secs;
    }
    if let Ok(addr) = std::env::var("FINTRACK_SERVER_ADDR") {
        config.server.bind_addr = addr;
    }
    if let Some(secs) = env_parse("FINTRACK_IDEMPOTENCY_TTL_SECS")? {
        config.server.idempotency_ttl_secs = secs;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `FinTrackError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FinTrackError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FinTrackError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FinTrackError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FinTrackError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FinTrackError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(FinTrackError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.json", "config.toml", "fintrack.json", "fintrack.toml"];
    const PARENTS: [&str; 4] = ["../config.json", "../config.toml", "../../config.json", "../../config.toml"];

    let mut candidates = Vec::new();
    let mut add_from = |dir: &Path| {
        candidates.extend(NAMES.iter().chain(PARENTS.iter()).map(|name| dir.join(name)));
    };

    if let Ok(cwd) = std::env::current_dir() {
        add_from(&cwd);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            add_from(exe_dir);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `FinTrackError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        FinTrackError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `FinTrackError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| FinTrackError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
