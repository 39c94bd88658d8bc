//! Domain layer - core types, errors and pure conversions.
//!
//! This layer contains domain models, configuration and error types
//! without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;
pub mod timestamp;

pub use config::{default_chat_db_path, AppConfig, DatabaseConfig, ExportConfig, ListConfig};
pub use error::{AppError, ErrorKind, Result};
pub use models::{
    AttachmentRecord, ConversationSummary, ConversationThread, ExportFormat, ExportOutcome,
    ExportRequest, MessageRecord, Passphrase, DEFAULT_EXPORT_FETCH_LIMIT, MAX_EXPORT_LIMIT,
    MIN_PASSPHRASE_CHARS,
};
pub use timestamp::format_store_time;
