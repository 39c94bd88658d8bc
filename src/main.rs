//! imexport - browse and export conversations from a message store.
//!
//! Reads the store strictly read-only and writes exports with owner-only
//! permissions:
//!   imexport list --search alice          # find a conversation
//!   imexport show 42 --limit 50           # read the newest 50 messages
//!   imexport export 42 -f json -o ~/x     # export to a file or directory
//!   imexport export 42 -f encrypted_package -o /tmp/a --passphrase-env PASS
//!   imexport decrypt /tmp/a.imexport -o /tmp/a_unpacked --passphrase-env PASS

mod cli;

use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands, ConfigAction, PassphraseArgs};
use imexport::application::{
    format_outcome, format_probe, format_summaries_json, format_summaries_table, format_thread,
    format_thread_json, ExportService, OutputFormat,
};
use imexport::domain::{self, AppConfig, AppError, ExportRequest, Passphrase};
use imexport::infrastructure::{
    config as config_file, decrypt_package, extract_package, load_config, MessagesDb,
};

/// Largest container `decrypt` will read into memory.
const MAX_CONTAINER_BYTES: u64 = 4 * 1024 * 1024 * 1024;

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<()> {
    let config = load_config()?;

    match cli.command {
        Commands::List {
            search,
            limit,
            format,
        } => {
            let db = open_db(&config, cli.db)?;
            cmd_list(&db, &search, limit.unwrap_or(config.list.limit), format)?;
        }
        Commands::Show {
            conversation_id,
            limit,
            before,
            format,
        } => {
            let db = open_db(&config, cli.db)?;
            cmd_show(&db, conversation_id, limit, before, format)?;
        }
        Commands::Export {
            conversation_id,
            format,
            output,
            overwrite,
            no_attachment_paths,
            copy_attachments,
            limit,
            secret,
        } => {
            let db = open_db(&config, cli.db)?;
            let format = format.unwrap_or(config.export.default_format);
            let output = output
                .or_else(|| config.export.default_dir.clone())
                .ok_or_else(|| {
                    AppError::invalid("--output is required when no default_dir is configured")
                })?;

            let mut request = ExportRequest::new(format, absolute(&output)?.to_string_lossy());
            request.overwrite = overwrite;
            request.include_attachment_paths = !no_attachment_paths;
            request.copy_attachments = copy_attachments;
            request.limit = limit;
            if format.is_package() {
                request = request.encrypted(read_passphrase(&secret)?);
            }

            cmd_export(&db, conversation_id, &request)?;
        }
        Commands::Decrypt {
            file,
            output_dir,
            secret,
        } => {
            cmd_decrypt(&file, &output_dir, &read_passphrase(&secret)?)?;
        }
        Commands::Probe => {
            let db = open_db(&config, cli.db)?;
            println!("{}", format_probe(&db.probe()?));
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => cmd_config_init()?,
            ConfigAction::Show => cmd_config_show(&config, cli.db)?,
        },
    }

    Ok(())
}

/// Opens the message store chosen by flag, environment, config or default.
fn open_db(config: &AppConfig, flag: Option<PathBuf>) -> domain::Result<MessagesDb> {
    MessagesDb::open(&config.database_path(flag))
}

/// List conversations command.
fn cmd_list(db: &MessagesDb, search: &str, limit: usize, format: OutputFormat) -> domain::Result<()> {
    let summaries = db.list_conversations(search, limit)?;

    match format {
        OutputFormat::Text => {
            println!("{}", format_summaries_table(&summaries));
            println!("{} conversation(s)", summaries.len().to_string().cyan());
        }
        OutputFormat::Json => {
            println!("{}", format_summaries_json(&summaries).map_err(AppError::json)?);
        }
    }
    Ok(())
}

/// Show a single conversation.
fn cmd_show(
    db: &MessagesDb,
    conversation_id: i64,
    limit: usize,
    before: Option<i64>,
    format: OutputFormat,
) -> domain::Result<()> {
    let thread = db.get_conversation(conversation_id, limit, before)?;

    let output = match format {
        OutputFormat::Text => format_thread(&thread),
        OutputFormat::Json => format_thread_json(&thread).map_err(AppError::json)?,
    };
    println!("{output}");

    if format == OutputFormat::Text {
        if let Some(oldest) = thread.messages.first() {
            println!(
                "{}",
                format!("Older messages: imexport show {conversation_id} --before {}", oldest.id)
                    .dimmed()
            );
        }
    }
    Ok(())
}

/// Export a conversation through the export service.
fn cmd_export(db: &MessagesDb, conversation_id: i64, request: &ExportRequest) -> domain::Result<()> {
    let thread = db.get_conversation(conversation_id, request.fetch_limit(), None)?;
    let service = ExportService::new();
    let outcome = service.export(&thread, request)?;
    println!("{}", format_outcome(&outcome));
    Ok(())
}

/// Decrypt a package into a directory.
fn cmd_decrypt(file: &Path, output_dir: &Path, passphrase: &Passphrase) -> domain::Result<()> {
    let size = std::fs::metadata(file)
        .map_err(|e| AppError::io(format!("Failed to read {}", file.display()), e))?
        .len();
    if size > MAX_CONTAINER_BYTES {
        return Err(AppError::invalid("Encrypted package is too large"));
    }

    let container = zeroize::Zeroizing::new(
        std::fs::read(file)
            .map_err(|e| AppError::io(format!("Failed to read {}", file.display()), e))?,
    );
    let package = decrypt_package(&container, passphrase)?;
    if let Ok(manifest) = package.manifest() {
        println!(
            "{} conversation {} ({} messages)",
            "Package:".bold(),
            manifest.conversation_id,
            manifest.message_count
        );
    }

    let written = extract_package(&package, output_dir)?;
    for path in &written {
        println!("  {} {}", "✓".green(), path.display());
    }
    println!("{} entries written to {}", written.len(), output_dir.display());
    Ok(())
}

/// Create the default configuration file.
fn cmd_config_init() -> domain::Result<()> {
    let path = config_file::config_file_path();
    if config_file::ensure_config_exists()? {
        println!("{} Created {}", "✓".green().bold(), path.display());
    } else {
        println!("Configuration already exists at {}", path.display());
    }
    Ok(())
}

/// Print the effective configuration.
fn cmd_config_show(config: &AppConfig, flag: Option<PathBuf>) -> domain::Result<()> {
    let rendered = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;
    println!("{} {}", "Config file:".bold(), AppConfig::config_file_path().display());
    println!("{} {}", "Message store:".bold(), config.database_path(flag).display());
    println!();
    println!("{rendered}");
    Ok(())
}

/// Reads the passphrase from the flag or the named environment variable.
fn read_passphrase(args: &PassphraseArgs) -> domain::Result<Passphrase> {
    if let Some(value) = &args.passphrase {
        return Ok(Passphrase::new(value.clone()));
    }
    if let Some(var) = &args.passphrase_env {
        return std::env::var(var)
            .map(Passphrase::new)
            .map_err(|_| AppError::invalid(format!("Environment variable {var} is not set")));
    }
    Err(AppError::invalid(
        "A passphrase is required: use --passphrase or --passphrase-env",
    ))
}

/// Makes a CLI path absolute against the working directory.
fn absolute(path: &Path) -> domain::Result<PathBuf> {
    let expanded = imexport::infrastructure::paths::expand_home(path);
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| AppError::io("Failed to read working directory", e))?;
    Ok(cwd.join(expanded))
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_joins_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("out.json")).unwrap(), cwd.join("out.json"));
        assert_eq!(
            absolute(Path::new("/tmp/out.json")).unwrap(),
            PathBuf::from("/tmp/out.json")
        );
    }

    #[test]
    fn test_read_passphrase_sources() {
        let direct = PassphraseArgs {
            passphrase: Some("from-flag-123".to_string()),
            passphrase_env: None,
        };
        assert_eq!(read_passphrase(&direct).unwrap().expose(), "from-flag-123");

        let missing = PassphraseArgs {
            passphrase: None,
            passphrase_env: Some("IMEXPORT_TEST_UNSET_PASSPHRASE_VAR".to_string()),
        };
        assert!(read_passphrase(&missing).is_err());

        let none = PassphraseArgs {
            passphrase: None,
            passphrase_env: None,
        };
        assert!(read_passphrase(&none).is_err());
    }

    #[test]
    fn test_export_format_default_is_json() {
        assert_eq!(
            AppConfig::default().export.default_format,
            imexport::domain::ExportFormat::Json
        );
    }
}
