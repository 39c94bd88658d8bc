//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use imexport::application::OutputFormat;
use imexport::domain::ExportFormat;
use imexport::infrastructure::messages_db::DEFAULT_MESSAGE_LIMIT;

/// imexport - browse and export conversations from a message store.
///
/// The store is only ever opened read-only.
#[derive(Parser, Debug)]
#[command(name = "imexport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Message store to read (overrides IMEXPORT_DB_PATH and the config file).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List conversations, most recent first.
    List {
        /// Only conversations whose title contains this text.
        #[arg(short, long, default_value = "")]
        search: String,

        /// Maximum number of conversations to show (config default if omitted).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a conversation.
    Show {
        /// Conversation ID (from `list`).
        conversation_id: i64,

        /// Show at most the newest N messages.
        #[arg(short, long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
        limit: usize,

        /// Only messages with an ID lower than this (page backwards).
        #[arg(short, long)]
        before: Option<i64>,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Export a conversation to a file.
    Export {
        /// Conversation ID (from `list`).
        conversation_id: i64,

        /// Export format: text, json, sqlite or encrypted_package.
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Destination file or directory (config default_dir if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace an existing destination file.
        #[arg(long)]
        overwrite: bool,

        /// Leave attachment paths out of the export.
        #[arg(long)]
        no_attachment_paths: bool,

        /// Copy attachment files next to the export (embedded for packages).
        #[arg(long)]
        copy_attachments: bool,

        /// Export at most the newest N messages.
        #[arg(short, long)]
        limit: Option<u32>,

        #[command(flatten)]
        secret: PassphraseArgs,
    },

    /// Decrypt an encrypted package into a directory.
    Decrypt {
        /// Encrypted package file.
        file: PathBuf,

        /// Directory to extract entries into; must be missing or empty.
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        secret: PassphraseArgs,
    },

    /// Check whether the message store schema is supported.
    Probe,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the passphrase comes from.
#[derive(clap::Args, Debug)]
pub struct PassphraseArgs {
    /// Passphrase (visible in the process list; prefer --passphrase-env).
    #[arg(long, conflicts_with = "passphrase_env")]
    pub passphrase: Option<String>,

    /// Name of an environment variable holding the passphrase.
    #[arg(long)]
    pub passphrase_env: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file if it does not exist.
    Init,
    /// Print the effective configuration.
    Show,
}
