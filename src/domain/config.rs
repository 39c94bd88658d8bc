//! Application configuration.
//!
//! Mirrors the TOML file at `~/.imexport/config.toml`. Every field has a
//! default so a missing or partial file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::models::ExportFormat;

/// Environment variable overriding the message store path.
pub const DB_PATH_ENV: &str = "IMEXPORT_DB_PATH";

/// Message store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the message store (defaults to `~/Library/Messages/chat.db`).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Defaults applied to `export` when flags are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Format used when `--format` is not given.
    #[serde(default = "default_format")]
    pub default_format: ExportFormat,

    /// Directory used when `--output` is not given.
    #[serde(default)]
    pub default_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            default_dir: None,
        }
    }
}

const fn default_format() -> ExportFormat {
    ExportFormat::Json
}

/// Conversation listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Number of summaries shown by `list`.
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            limit: default_list_limit(),
        }
    }
}

const fn default_list_limit() -> usize {
    200
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub list: ListConfig,
}

impl AppConfig {
    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".imexport")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Resolve the message store path.
    ///
    /// Precedence: explicit override, then `IMEXPORT_DB_PATH`, then the
    /// config file, then the platform default.
    #[must_use]
    pub fn database_path(&self, override_path: Option<PathBuf>) -> PathBuf {
        override_path
            .or_else(|| std::env::var_os(DB_PATH_ENV).map(PathBuf::from))
            .or_else(|| self.database.path.clone())
            .unwrap_or_else(default_chat_db_path)
    }
}

/// Default location of the message store.
#[must_use]
pub fn default_chat_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join("Library")
        .join("Messages")
        .join("chat.db")
}
