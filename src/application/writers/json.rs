//! JSON export: the thread plus a small manifest.

use std::path::Path;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::domain::{AppError, ConversationThread, Result};

use super::{ExportView, FormatWriter, Rendered};

/// Schema tag written into the manifest.
pub const JSON_SCHEMA: &str = "ConversationThread";

#[derive(Serialize)]
struct JsonExport<'a> {
    thread: &'a ConversationThread,
    manifest: JsonManifest,
}

#[derive(Serialize)]
struct JsonManifest {
    schema: &'static str,
    message_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter;

impl FormatWriter for JsonWriter {
    fn render(&self, view: &ExportView, _destination: &Path) -> Result<Rendered> {
        render_json(&view.thread).map(|bytes| Rendered::Bytes(Zeroizing::new(bytes)))
    }
}

/// Pretty-printed `{"thread": …, "manifest": …}`.
///
/// # Errors
/// Returns error if serialization fails.
pub fn render_json(thread: &ConversationThread) -> Result<Vec<u8>> {
    let export = JsonExport {
        thread,
        manifest: JsonManifest {
            schema: JSON_SCHEMA,
            message_count: thread.message_count(),
        },
    };
    serde_json::to_vec_pretty(&export).map_err(AppError::json)
}
