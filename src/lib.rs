//! imexport - read-only message archive export.
//!
//! Reads conversations from a legacy message store without ever writing to
//! it, and exports them as plain text, JSON, a relational snapshot or a
//! passphrase-encrypted package.
//!
//! ```no_run
//! use std::path::Path;
//! use imexport::application::ExportService;
//! use imexport::domain::{ExportFormat, ExportRequest};
//! use imexport::infrastructure::MessagesDb;
//!
//! # fn main() -> imexport::domain::Result<()> {
//! let db = MessagesDb::open(Path::new("/Users/me/Library/Messages/chat.db"))?;
//! let thread = db.get_conversation(42, 500, None)?;
//! let request = ExportRequest::new(ExportFormat::Json, "/Users/me/Exports/chat.json");
//! let outcome = ExportService::new().export(&thread, &request)?;
//! println!("{} messages -> {}", outcome.message_count, outcome.output_path.display());
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
