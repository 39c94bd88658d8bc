//! Plain-text transcript.

use std::fmt::Write as _;
use std::path::Path;

use zeroize::Zeroizing;

use crate::domain::{ConversationThread, Result};

use super::{ExportView, FormatWriter, Rendered};

/// `[timestamp] sender: text` per message, one line per attachment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextWriter;

impl FormatWriter for TextWriter {
    fn render(&self, view: &ExportView, _destination: &Path) -> Result<Rendered> {
        Ok(Rendered::Bytes(Zeroizing::new(
            render_text(&view.thread).into_bytes(),
        )))
    }
}

/// Renders the transcript; newlines inside a message become spaces.
#[must_use]
pub fn render_text(thread: &ConversationThread) -> String {
    let mut out = String::new();
    for message in &thread.messages {
        let text = message.text.as_deref().unwrap_or_default().replace('\n', " ");
        let _ = writeln!(out, "[{}] {}: {}", message.timestamp, message.sender, text.trim());

        for attachment in &message.attachments {
            let _ = write!(
                out,
                "[Attachment] {} ({})",
                attachment.filename,
                attachment.mime_type.as_deref().unwrap_or("unknown")
            );
            if let Some(path) = attachment.path.as_deref().filter(|p| !p.is_empty()) {
                let _ = write!(out, " {path}");
            }
            out.push('\n');
        }
    }
    if out.is_empty() {
        out.push('\n');
    }
    out
}
