//! Format writers.
//!
//! One writer per [`ExportFormat`]. Writers either hand back the bytes for
//! the service to store with hardened permissions, or write the destination
//! themselves when the format needs a real file (the SQLite snapshot).

mod json;
mod package;
mod sqlite;
mod text;

use std::path::Path;

use zeroize::Zeroizing;

use crate::domain::{AppError, ExportFormat, Passphrase, Result};
use crate::infrastructure::package::PackageEntry;

use super::prepare::ExportView;

pub use json::{render_json, JsonWriter, JSON_SCHEMA};
pub use package::PackageWriter;
pub use sqlite::{SqliteWriter, SNAPSHOT_SCHEMA};
pub use text::{render_text, TextWriter};

/// Output of a writer.
#[derive(Debug)]
pub enum Rendered {
    /// Bytes for the service to write; wiped on drop.
    Bytes(Zeroizing<Vec<u8>>),
    /// The writer already produced the destination file.
    Written,
}

/// A single export format.
pub trait FormatWriter {
    /// Serializes `view` for `destination`.
    ///
    /// # Errors
    /// Returns error if serialization or a direct write fails.
    fn render(&self, view: &ExportView, destination: &Path) -> Result<Rendered>;
}

/// Writer for each export format.
#[derive(Debug)]
pub enum Writer {
    Text(TextWriter),
    Json(JsonWriter),
    Sqlite(SqliteWriter),
    EncryptedPackage(PackageWriter),
}

impl Writer {
    /// Picks the writer for `format`.
    ///
    /// `attachments` are only used by the package writer.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if a package is requested without a passphrase.
    pub fn for_format(
        format: ExportFormat,
        passphrase: Option<&Passphrase>,
        attachments: Vec<PackageEntry>,
    ) -> Result<Self> {
        Ok(match format {
            ExportFormat::Text => Self::Text(TextWriter),
            ExportFormat::Json => Self::Json(JsonWriter),
            ExportFormat::Sqlite => Self::Sqlite(SqliteWriter),
            ExportFormat::EncryptedPackage => {
                let passphrase = passphrase.ok_or_else(|| {
                    AppError::invalid("passphrase is required for encrypted exports")
                })?;
                Self::EncryptedPackage(PackageWriter::new(passphrase.clone(), attachments))
            }
        })
    }

    #[must_use]
    pub const fn format(&self) -> ExportFormat {
        match self {
            Self::Text(_) => ExportFormat::Text,
            Self::Json(_) => ExportFormat::Json,
            Self::Sqlite(_) => ExportFormat::Sqlite,
            Self::EncryptedPackage(_) => ExportFormat::EncryptedPackage,
        }
    }
}

impl FormatWriter for Writer {
    fn render(&self, view: &ExportView, destination: &Path) -> Result<Rendered> {
        match self {
            Self::Text(w) => w.render(view, destination),
            Self::Json(w) => w.render(view, destination),
            Self::Sqlite(w) => w.render(view, destination),
            Self::EncryptedPackage(w) => w.render(view, destination),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{AttachmentRecord, ConversationThread, MessageRecord};

    use super::super::prepare::ExportView;

    pub fn view() -> ExportView {
        ExportView {
            thread: ConversationThread {
                id: 3,
                title: "Book club".to_string(),
                participants: vec!["Me".to_string(), "bob@example.com".to_string()],
                messages: vec![
                    MessageRecord {
                        id: 100,
                        timestamp: "2023-03-08 20:26".to_string(),
                        sender: "bob@example.com".to_string(),
                        text: Some("chapter 3\nis great ".to_string()),
                        is_from_me: false,
                        attachments: vec![AttachmentRecord {
                            filename: "notes.pdf".to_string(),
                            mime_type: Some("application/pdf".to_string()),
                            path: Some("/tmp/notes.pdf".to_string()),
                        }],
                    },
                    MessageRecord {
                        id: 101,
                        timestamp: "2023-03-08 20:30".to_string(),
                        sender: "Me".to_string(),
                        text: None,
                        is_from_me: true,
                        attachments: vec![AttachmentRecord {
                            filename: "voice.caf".to_string(),
                            mime_type: None,
                            path: None,
                        }],
                    },
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[test]
    fn test_dispatch_covers_every_format() {
        let passphrase = Passphrase::new("correct horse");
        for format in [
            ExportFormat::Text,
            ExportFormat::Json,
            ExportFormat::Sqlite,
            ExportFormat::EncryptedPackage,
        ] {
            let writer = Writer::for_format(format, Some(&passphrase), Vec::new()).unwrap();
            assert_eq!(writer.format(), format);
        }
    }

    #[test]
    fn test_package_requires_passphrase() {
        let err = Writer::for_format(ExportFormat::EncryptedPackage, None, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
