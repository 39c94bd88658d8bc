//! Relational snapshot export.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};

use crate::domain::{AppError, ConversationThread, Result};
use crate::infrastructure::secure_fs::{create_exclusive, harden_file};

use super::{ExportView, FormatWriter, Rendered};

/// Tables of a snapshot.
pub const SNAPSHOT_SCHEMA: &str = r"
CREATE TABLE conversations (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL
);
CREATE TABLE participants (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  conversation_id INTEGER NOT NULL,
  handle TEXT NOT NULL,
  FOREIGN KEY(conversation_id) REFERENCES conversations(id)
);
CREATE TABLE messages (
  id INTEGER PRIMARY KEY,
  conversation_id INTEGER NOT NULL,
  sender TEXT NOT NULL,
  timestamp TEXT NOT NULL,
  text TEXT,
  is_from_me INTEGER NOT NULL,
  FOREIGN KEY(conversation_id) REFERENCES conversations(id)
);
CREATE TABLE attachments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  message_id INTEGER NOT NULL,
  filename TEXT NOT NULL,
  mime_type TEXT,
  path TEXT,
  FOREIGN KEY(message_id) REFERENCES messages(id)
);
";

/// Writes a fresh single-file database at the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteWriter;

impl FormatWriter for SqliteWriter {
    fn render(&self, view: &ExportView, destination: &Path) -> Result<Rendered> {
        // the resolver has already applied the overwrite gate
        if fs::symlink_metadata(destination).is_ok() {
            fs::remove_file(destination)
                .map_err(|e| AppError::io("Failed to replace existing snapshot", e))?;
        }
        drop(create_exclusive(destination)?);

        let written = write_snapshot(destination, &view.thread);
        harden_file(destination)?;
        written?;

        tracing::debug!(destination = %destination.display(), "Snapshot written");
        Ok(Rendered::Written)
    }
}

fn write_snapshot(destination: &Path, thread: &ConversationThread) -> Result<()> {
    let mut conn = Connection::open(destination).map_err(AppError::database)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(AppError::database)?;
    conn.execute_batch(SNAPSHOT_SCHEMA)
        .map_err(AppError::database)?;

    let tx = conn.transaction().map_err(AppError::database)?;
    tx.execute(
        "INSERT INTO conversations (id, title) VALUES (?1, ?2)",
        params![thread.id, thread.title],
    )
    .map_err(AppError::database)?;

    {
        let mut participant = tx
            .prepare("INSERT INTO participants (conversation_id, handle) VALUES (?1, ?2)")
            .map_err(AppError::database)?;
        for handle in &thread.participants {
            participant
                .execute(params![thread.id, handle])
                .map_err(AppError::database)?;
        }

        let mut message = tx
            .prepare(
                "INSERT INTO messages (id, conversation_id, sender, timestamp, text, is_from_me)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(AppError::database)?;
        let mut attachment = tx
            .prepare(
                "INSERT INTO attachments (message_id, filename, mime_type, path)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(AppError::database)?;

        for m in &thread.messages {
            message
                .execute(params![
                    m.id,
                    thread.id,
                    m.sender,
                    m.timestamp,
                    m.text,
                    i32::from(m.is_from_me)
                ])
                .map_err(AppError::database)?;
            for a in &m.attachments {
                attachment
                    .execute(params![m.id, a.filename, a.mime_type, a.path])
                    .map_err(AppError::database)?;
            }
        }
    }

    tx.commit().map_err(AppError::database)?;
    conn.close().map_err(|(_, e)| AppError::database(e))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::view;
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thread.sqlite");

        let rendered = SqliteWriter.render(&view(), &path).unwrap();
        assert!(matches!(rendered, Rendered::Written));

        let conn = Connection::open(&path).unwrap();
        let title: String = conn
            .query_row("SELECT title FROM conversations WHERE id = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Book club");

        let participants: i64 = conn
            .query_row("SELECT COUNT(*) FROM participants", [], |r| r.get(0))
            .unwrap();
        assert_eq!(participants, 2);

        let (text, from_me): (Option<String>, i64) = conn
            .query_row(
                "SELECT text, is_from_me FROM messages WHERE id = 101",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(text, None);
        assert_eq!(from_me, 1);

        let paths: Vec<Option<String>> = conn
            .prepare("SELECT path FROM attachments ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(paths, vec![Some("/tmp/notes.pdf".to_string()), None]);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_existing_snapshot_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thread.sqlite");
        fs::write(&path, b"not a database").unwrap();

        SqliteWriter.render(&view(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
