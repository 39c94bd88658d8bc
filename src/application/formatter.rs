//! Console formatting for conversations, listings and export results.
//!
//! Supports a human-readable view and JSON for programmatic use.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{ConversationSummary, ConversationThread, ExportOutcome};
use crate::infrastructure::SchemaProbe;

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable transcript or table.
    #[default]
    Text,
    /// JSON for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "table" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}. Use: text, json")),
        }
    }
}

/// Formats a conversation for the terminal.
pub fn format_thread(thread: &ConversationThread) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", thread.title.bold()));
    out.push_str(&format!(
        "{} {}\n",
        "Participants:".dimmed(),
        thread.participants.join(", ")
    ));
    out.push_str(&format!(
        "{} {} ({} attachments)\n\n",
        "Messages:".dimmed(),
        thread.message_count(),
        thread.attachment_count()
    ));

    for message in &thread.messages {
        let sender = if message.is_from_me {
            message.sender.green().bold()
        } else {
            message.sender.cyan().bold()
        };
        out.push_str(&format!(
            "{} {} {}\n",
            format!("[{}]", message.timestamp).dimmed(),
            sender,
            format!("#{}", message.id).dimmed()
        ));
        if let Some(text) = &message.text {
            for line in text.lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
        for attachment in &message.attachments {
            out.push_str(&format!(
                "  📎 {} ({})",
                attachment.filename,
                attachment.mime_type.as_deref().unwrap_or("unknown")
            ));
            if let Some(path) = &attachment.path {
                out.push_str(&format!(" {}", path.dimmed()));
            }
            out.push('\n');
        }
    }

    out
}

/// Formats a table listing of conversations.
pub fn format_summaries_table(summaries: &[ConversationSummary]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Last activity", "Title", "Latest message"]);

    for summary in summaries {
        let timestamp = if summary.timestamp.is_empty() {
            "-".to_string()
        } else {
            summary.timestamp.clone()
        };
        table.add_row(vec![
            summary.id.to_string(),
            timestamp,
            truncate(&summary.title, 30),
            truncate(&summary.snippet, 45),
        ]);
    }

    table.to_string()
}

/// Formats conversation summaries as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_summaries_json(summaries: &[ConversationSummary]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summaries)
}

/// Formats a conversation as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_thread_json(thread: &ConversationThread) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(thread)
}

/// Formats a schema probe report.
pub fn format_probe(probe: &SchemaProbe) -> String {
    let mut out = String::new();
    let status = if probe.is_supported() {
        "supported".green().bold()
    } else {
        "unsupported".red().bold()
    };
    out.push_str(&format!("{} {status}\n", "Schema:".bold()));

    for (table, columns) in [
        ("chat", &probe.chat_columns),
        ("message", &probe.message_columns),
        ("handle", &probe.handle_columns),
        ("attachment", &probe.attachment_columns),
    ] {
        let listed = if columns.is_empty() {
            "(missing)".yellow().to_string()
        } else {
            columns.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        out.push_str(&format!("  {:<11} {listed}\n", format!("{table}:")));
    }

    if !probe.required_missing.is_empty() {
        out.push_str(&format!(
            "  {} {}\n",
            "Missing required:".red(),
            probe.required_missing.join(", ")
        ));
    }
    out.push_str(&format!(
        "  attributedBody fallback: {}\n",
        if probe.has_attributed_body() { "on" } else { "off" }
    ));
    out
}

/// Formats a completed export for display.
pub fn format_outcome(outcome: &ExportOutcome) -> String {
    format!(
        "{} Exported {} messages to {}",
        "✓".green().bold(),
        outcome.message_count.to_string().cyan(),
        outcome.output_path.display()
    )
}

/// Truncates to the first line and at most `max_chars` characters.
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
