//! Schema detection for the message store.
//!
//! Store layouts drift between OS releases, so every connection is probed
//! before querying: required columns must be present, optional ones switch
//! features on.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;

use crate::domain::{AppError, Result};

const REQUIRED_CHAT: &[&str] = &["ROWID", "guid"];
const REQUIRED_MESSAGE: &[&str] = &["ROWID", "date", "is_from_me"];

/// Columns found in the probed tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaProbe {
    pub chat_columns: BTreeSet<String>,
    pub message_columns: BTreeSet<String>,
    pub handle_columns: BTreeSet<String>,
    pub attachment_columns: BTreeSet<String>,
    /// Required columns that are absent, as `table.column`.
    pub required_missing: Vec<String>,
}

impl SchemaProbe {
    /// Reads `PRAGMA table_info` for the tables the repository queries.
    ///
    /// # Errors
    /// Returns error if the pragma queries fail.
    pub fn run(conn: &Connection) -> Result<Self> {
        let chat_columns = table_columns(conn, "chat")?;
        let message_columns = table_columns(conn, "message")?;
        let handle_columns = table_columns(conn, "handle")?;
        let attachment_columns = table_columns(conn, "attachment")?;

        let mut required_missing = Vec::new();
        for col in REQUIRED_CHAT {
            if !chat_columns.contains(*col) {
                required_missing.push(format!("chat.{col}"));
            }
        }
        for col in REQUIRED_MESSAGE {
            if !message_columns.contains(*col) {
                required_missing.push(format!("message.{col}"));
            }
        }

        Ok(Self {
            chat_columns,
            message_columns,
            handle_columns,
            attachment_columns,
            required_missing,
        })
    }

    /// Whether every required column exists.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.required_missing.is_empty()
    }

    /// Fails with an internal error naming the missing columns.
    ///
    /// # Errors
    /// Returns error if the schema is unsupported.
    pub fn ensure_supported(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Unsupported message store schema; missing: {}",
                self.required_missing.join(", ")
            )))
        }
    }

    /// Whether messages carry an archived rich-text body.
    #[must_use]
    pub fn has_attributed_body(&self) -> bool {
        self.message_columns.contains("attributedBody")
    }

    /// Whether attachments record a user-facing transfer name.
    #[must_use]
    pub fn has_transfer_name(&self) -> bool {
        self.attachment_columns.contains("transfer_name")
    }
}

/// Column names of `table`; empty when the table does not exist.
fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    // table names come from the constants above, never from callers
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(AppError::database)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(AppError::database)?;

    let mut columns = BTreeSet::new();
    for row in rows {
        columns.insert(row.map_err(AppError::database)?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_detects_missing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, guid TEXT);
             CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT);",
        )
        .unwrap();

        let probe = SchemaProbe::run(&conn).unwrap();

        assert!(!probe.is_supported());
        assert_eq!(probe.required_missing, vec!["message.date", "message.is_from_me"]);
        assert!(probe.ensure_supported().is_err());
        assert!(probe.handle_columns.is_empty());
    }

    #[test]
    fn test_probe_optional_features() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, guid TEXT);
             CREATE TABLE message (ROWID INTEGER PRIMARY KEY, date INTEGER,
                                   is_from_me INTEGER, attributedBody BLOB);
             CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY, filename TEXT);",
        )
        .unwrap();

        let probe = SchemaProbe::run(&conn).unwrap();

        assert!(probe.is_supported());
        assert!(probe.has_attributed_body());
        assert!(!probe.has_transfer_name());
    }
}
