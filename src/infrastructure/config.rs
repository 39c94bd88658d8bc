//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use super::secure_fs::{ensure_private_dir, secure_write};
use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# imexport configuration
# Auto-generated - edit as needed

[database]
# Message store to read (default: ~/Library/Messages/chat.db).
# IMEXPORT_DB_PATH and --db take precedence over this value.
# path = "/Users/me/Library/Messages/chat.db"

[export]
# Format used when --format is omitted: text, json, sqlite, encrypted_package
default_format = "json"

# Directory used when --output is omitted (must be absolute)
# default_dir = "/Users/me/Exports"

[list]
# Number of conversations shown by `imexport list`
limit = 200
"#;

/// Load configuration from file or fall back to defaults.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config() -> Result<AppConfig> {
    let config_path = AppConfig::config_file_path();

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Save configuration to `path` with owner-only permissions.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;
    secure_write(path, content.as_bytes())?;

    tracing::info!(path = %path.display(), "Configuration saved");
    Ok(())
}

/// Write the commented default configuration to `path` unless it exists.
///
/// Returns whether a file was created.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_at(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    secure_write(path, DEFAULT_CONFIG.as_bytes())?;

    tracing::info!(path = %path.display(), "Created default configuration");
    Ok(true)
}

/// Create the default configuration file if it doesn't exist.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<bool> {
    ensure_config_at(&config_file_path())
}

/// Get the path to the configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::config_file_path()
}
