//! Application layer - use cases and orchestration.
//!
//! This layer contains the export pipeline: destination resolution,
//! attachment collection, view preparation, format writers and the
//! single-flight export service.

pub mod attachments;
pub mod export_service;
pub mod formatter;
pub mod path_resolver;
pub mod prepare;
pub mod writers;

pub use export_service::ExportService;
pub use formatter::{
    format_outcome, format_probe, format_summaries_json, format_summaries_table, format_thread,
    format_thread_json, OutputFormat,
};
pub use path_resolver::{resolve_destination, ExportSandbox};
pub use prepare::{prepare, ExportView};
pub use writers::{FormatWriter, Rendered, Writer};
