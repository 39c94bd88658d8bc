//! Domain-level error types for imexport.
//!
//! All errors are typed with `thiserror`. Each variant collapses into one of
//! five caller-facing categories (see [`ErrorKind`]) so the API layer can map
//! them without inspecting messages.

use std::path::Path;
use thiserror::Error;

/// Generic message surfaced for internal failures.
const INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or unsafe request: bad destination, short passphrase, etc.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Requested resource (conversation, database file) does not exist.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Another export holds the single-flight guard.
    #[error("Service busy: another export is already running")]
    ServiceBusy,

    /// Authentication tag mismatch or a malformed container header.
    #[error("Crypto failure: {message}")]
    Crypto { message: String },

    /// Failed to open or query a database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// JSON serialization or parsing failed.
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Building or reading the package archive failed.
    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unexpected internal condition.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Caller-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    ServiceBusy,
    CryptoFailure,
    InternalFailure,
}

impl ErrorKind {
    /// Stable code for the external API layer.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::ServiceBusy => "service_busy",
            Self::CryptoFailure => "crypto_failure",
            Self::InternalFailure => "internal_error",
        }
    }
}

impl AppError {
    /// Create an invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a JSON error.
    pub fn json(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an archive error.
    pub fn archive(err: zip::result::ZipError) -> Self {
        Self::Archive {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a not-found error for a missing database file.
    pub fn database_not_found(path: &Path, reason: &str) -> Self {
        Self::not_found(format!("{reason}: {}", path.display()))
    }

    /// Category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ServiceBusy => ErrorKind::ServiceBusy,
            Self::Crypto { .. } => ErrorKind::CryptoFailure,
            Self::Database { .. }
            | Self::Io { .. }
            | Self::Json { .. }
            | Self::Archive { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorKind::InternalFailure,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Internal failures are reduced to a generic sentence; everything else
    /// carries its specific reason.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest { message }
            | Self::NotFound { message }
            | Self::Crypto { message } => message.clone(),
            Self::ServiceBusy => "Another export is already running".to_string(),
            _ => INTERNAL_MESSAGE.to_string(),
        }
    }

    /// Whether the caller may retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceBusy)
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
