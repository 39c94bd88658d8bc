//! Domain models for archived conversations and export requests.
//!
//! These models are what the repository produces and what the export
//! pipeline consumes.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum passphrase length, in characters, for encrypted exports.
pub const MIN_PASSPHRASE_CHARS: usize = 8;

/// Largest message limit an export request may ask for.
pub const MAX_EXPORT_LIMIT: u32 = 100_000;

/// Messages fetched for an export when the request sets no limit.
pub const DEFAULT_EXPORT_FETCH_LIMIT: usize = 10_000;

/// Attachment metadata for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Display filename (transfer name when known).
    pub filename: String,
    /// MIME type, if the store recorded one.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Filesystem path of the attachment payload.
    #[serde(default)]
    pub path: Option<String>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Store row identifier.
    pub id: i64,
    /// Display timestamp, empty when the raw value is unrepresentable.
    pub timestamp: String,
    /// Sender handle, `Me` for the account owner.
    pub sender: String,
    /// Message body.
    #[serde(default)]
    pub text: Option<String>,
    /// Whether the account owner sent this message.
    pub is_from_me: bool,
    /// Attachments in insertion order.
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

/// A conversation with its participants and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Store row identifier of the chat.
    pub id: i64,
    /// Resolved display title.
    pub title: String,
    /// Distinct participant handles, sorted case-insensitively.
    #[serde(default)]
    pub participants: Vec<String>,
    /// Messages in ascending chronological order.
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

impl ConversationThread {
    /// Total message count.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Total attachment count across all messages.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.messages.iter().map(|m| m.attachments.len()).sum()
    }
}

/// Listing entry for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    /// Text of the most recent message.
    pub snippet: String,
    /// Display timestamp of the most recent message.
    pub timestamp: String,
    /// Read state is not tracked; always false.
    #[serde(default)]
    pub unread: bool,
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// One line per message.
    Text,
    /// Pretty-printed conversation plus manifest.
    Json,
    /// Fresh single-file relational snapshot.
    Sqlite,
    /// Encrypted, compressed package of named entries.
    EncryptedPackage,
}

impl ExportFormat {
    /// Mandatory file extension, including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => ".txt",
            Self::Json => ".json",
            Self::Sqlite => ".sqlite",
            Self::EncryptedPackage => ".imexport",
        }
    }

    /// Wire name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
            Self::EncryptedPackage => "encrypted_package",
        }
    }

    /// Whether attachments are embedded instead of copied to disk.
    #[must_use]
    pub const fn is_package(self) -> bool {
        matches!(self, Self::EncryptedPackage)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            "encrypted_package" | "encrypted-package" | "imexport" => Ok(Self::EncryptedPackage),
            _ => Err(format!(
                "Unknown format: {s}. Use: text, json, sqlite, encrypted_package"
            )),
        }
    }
}

/// Passphrase wrapper, wiped from memory on drop and never printed.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length in characters (not bytes).
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the passphrase meets the minimum length.
    #[must_use]
    pub fn is_strong_enough(&self) -> bool {
        self.char_len() >= MIN_PASSPHRASE_CHARS
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

const fn default_include_attachment_paths() -> bool {
    true
}

/// Parameters for a single export.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportRequest {
    pub format: ExportFormat,
    /// Absolute destination file or directory.
    pub destination_path: String,
    #[serde(default)]
    pub overwrite: bool,
    /// Keep attachment paths in the output.
    #[serde(default = "default_include_attachment_paths")]
    pub include_attachment_paths: bool,
    /// Copy (or embed) attachment files alongside the export.
    #[serde(default)]
    pub copy_attachments: bool,
    /// Cap on messages fetched for the export.
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub passphrase: Option<Passphrase>,
}

impl ExportRequest {
    /// Create a request with default flags.
    #[must_use]
    pub fn new(format: ExportFormat, destination_path: impl Into<String>) -> Self {
        Self {
            format,
            destination_path: destination_path.into(),
            overwrite: false,
            include_attachment_paths: true,
            copy_attachments: false,
            limit: None,
            encrypt: false,
            passphrase: None,
        }
    }

    /// Allow replacing an existing destination.
    #[must_use]
    pub const fn with_overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Copy or embed attachment files.
    #[must_use]
    pub const fn with_copy_attachments(mut self) -> Self {
        self.copy_attachments = true;
        self
    }

    /// Strip attachment paths from the output.
    #[must_use]
    pub const fn without_attachment_paths(mut self) -> Self {
        self.include_attachment_paths = false;
        self
    }

    /// Limit the number of exported messages.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enable encryption with the given passphrase.
    #[must_use]
    pub fn encrypted(mut self, passphrase: Passphrase) -> Self {
        self.encrypt = true;
        self.passphrase = Some(passphrase);
        self
    }

    /// Number of messages to fetch from the store for this export.
    #[must_use]
    pub fn fetch_limit(&self) -> usize {
        self.limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(DEFAULT_EXPORT_FETCH_LIMIT)
    }

    /// Checks the request-level invariants.
    ///
    /// # Errors
    /// Returns `InvalidRequest` describing the first violated rule.
    pub fn validate(&self) -> crate::domain::Result<()> {
        use crate::domain::AppError;

        if self.destination_path.contains('\0') {
            return Err(AppError::invalid(
                "destination_path contains an invalid byte",
            ));
        }
        if !std::path::Path::new(&self.destination_path).is_absolute() {
            return Err(AppError::invalid("destination_path must be absolute"));
        }
        if let Some(limit) = self.limit {
            if !(1..=MAX_EXPORT_LIMIT).contains(&limit) {
                return Err(AppError::invalid(format!(
                    "limit must be between 1 and {MAX_EXPORT_LIMIT}"
                )));
            }
        }
        if self.encrypt
            && !self
                .passphrase
                .as_ref()
                .is_some_and(Passphrase::is_strong_enough)
        {
            return Err(AppError::invalid(format!(
                "passphrase is required and must be at least {MIN_PASSPHRASE_CHARS} characters"
            )));
        }
        match (self.format, self.encrypt) {
            (ExportFormat::EncryptedPackage, false) => Err(AppError::invalid(
                "encrypt must be true for encrypted_package format",
            )),
            (ExportFormat::Text | ExportFormat::Json | ExportFormat::Sqlite, true) => {
                Err(AppError::invalid(
                    "encrypt is only supported by the encrypted_package format",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Result of a completed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    /// Final, resolved destination.
    pub output_path: std::path::PathBuf,
    /// Number of messages written.
    pub message_count: usize,
}
