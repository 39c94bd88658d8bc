//! Conversation export orchestration.
//!
//! One export runs at a time per service instance. A second caller is
//! turned away with `ServiceBusy` instead of waiting.

use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::domain::{AppError, ConversationThread, ExportOutcome, ExportRequest, Result};
use crate::infrastructure::secure_fs::secure_write;

use super::attachments::{copy_to_disk, embed_in_package, AttachmentRewrites};
use super::path_resolver::ExportSandbox;
use super::prepare::prepare;
use super::writers::{FormatWriter, Rendered, Writer};

/// Exports conversations to disk.
#[derive(Debug, Default)]
pub struct ExportService {
    in_flight: Mutex<()>,
    sandbox: ExportSandbox,
}

impl ExportService {
    /// Service writing under the home and temporary directories.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sandbox(ExportSandbox::system())
    }

    /// Service writing under explicit roots.
    #[must_use]
    pub fn with_sandbox(sandbox: ExportSandbox) -> Self {
        Self {
            in_flight: Mutex::new(()),
            sandbox,
        }
    }

    /// Takes the single-flight guard without blocking.
    pub(crate) fn try_begin(&self) -> Result<MutexGuard<'_, ()>> {
        self.in_flight.try_lock().ok_or(AppError::ServiceBusy)
    }

    /// Whether an export is currently running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_locked()
    }

    /// Exports `conversation` as described by `request`.
    ///
    /// The conversation is only read; attachment rewrites and redaction
    /// happen on a prepared copy.
    ///
    /// # Errors
    /// `ServiceBusy` if another export is running, `InvalidRequest` for a
    /// bad request or destination, `CryptoFailure`/internal errors from the
    /// writers and filesystem.
    pub fn export(
        &self,
        conversation: &ConversationThread,
        request: &ExportRequest,
    ) -> Result<ExportOutcome> {
        let _flight = self.try_begin()?;
        let start = Instant::now();

        request.validate()?;
        let destination =
            self.sandbox
                .resolve(&request.destination_path, request.format, request.overwrite)?;

        tracing::info!(
            format = %request.format,
            conversation_id = conversation.id,
            messages = conversation.message_count(),
            destination = %destination.display(),
            "Starting export"
        );

        let mut embedded = Vec::new();
        let rewrites = if !request.copy_attachments {
            AttachmentRewrites::new()
        } else if request.format.is_package() {
            let collected = embed_in_package(conversation);
            embedded = collected.entries;
            collected.rewrites
        } else {
            copy_to_disk(conversation, &destination)?
        };

        let view = prepare(conversation, &rewrites, request.include_attachment_paths);
        let writer = Writer::for_format(request.format, request.passphrase.as_ref(), embedded)?;

        match writer.render(&view, &destination)? {
            Rendered::Bytes(bytes) => secure_write(&destination, &bytes)?,
            Rendered::Written => {}
        }

        let outcome = ExportOutcome {
            output_path: destination,
            message_count: view.message_count(),
        };
        tracing::info!(
            format = %request.format,
            messages = outcome.message_count,
            destination = %outcome.output_path.display(),
            duration_ms = start.elapsed().as_millis(),
            "Export completed"
        );
        Ok(outcome)
    }
}
