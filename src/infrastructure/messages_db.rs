//! Read-only repository over the legacy message store.
//!
//! The store is opened per call with `SQLITE_OPEN_READ_ONLY` and
//! `query_only`, probed for its schema, queried and closed again. Nothing
//! here ever writes to it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use super::paths::expand_home;
use super::schema_probe::SchemaProbe;
use super::text_decoder::{normalize, preferred_text};
use crate::domain::timestamp::{format_store_time, format_store_time_f64};
use crate::domain::{
    AppError, AttachmentRecord, ConversationSummary, ConversationThread, MessageRecord, Result,
};

/// Sender label for the account owner.
pub const SELF_SENDER: &str = "Me";
/// Sender label when no handle is recorded.
pub const UNKNOWN_SENDER: &str = "Unknown";

pub const MAX_LIST_LIMIT: usize = 1_000;
pub const DEFAULT_LIST_LIMIT: usize = 200;
pub const DEFAULT_MESSAGE_LIMIT: usize = 200;
pub const MAX_MESSAGE_LIMIT: usize = 10_000;

/// Read-only access to the message store.
#[derive(Debug, Clone)]
pub struct MessagesDb {
    db_path: PathBuf,
}

impl MessagesDb {
    /// Validates the store location without opening it.
    ///
    /// # Errors
    /// Returns `NotFound` if the path is relative, missing, a symlink or not
    /// a regular file.
    pub fn open(path: &Path) -> Result<Self> {
        let db_path = expand_home(path);
        if !db_path.is_absolute() {
            return Err(AppError::database_not_found(
                &db_path,
                "Message store path must be absolute",
            ));
        }

        let meta = fs::symlink_metadata(&db_path)
            .map_err(|_| AppError::database_not_found(&db_path, "Message store not found"))?;
        if meta.file_type().is_symlink() {
            return Err(AppError::database_not_found(
                &db_path,
                "Message store path cannot be a symlink",
            ));
        }
        if !meta.is_file() {
            return Err(AppError::database_not_found(
                &db_path,
                "Message store path must point to a file",
            ));
        }

        tracing::debug!(path = %db_path.display(), "Using message store");
        Ok(Self { db_path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Opens a fresh read-only connection and probes its schema.
    fn connect(&self) -> Result<(Connection, SchemaProbe)> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.db_path, flags).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA query_only = ON;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(AppError::database)?;

        let probe = SchemaProbe::run(&conn)?;
        probe.ensure_supported()?;
        Ok((conn, probe))
    }

    /// Runs the schema probe on its own.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened.
    pub fn probe(&self) -> Result<SchemaProbe> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.db_path, flags).map_err(AppError::database)?;
        SchemaProbe::run(&conn)
    }

    /// Lists conversations, most recently active first.
    ///
    /// An empty `search` matches everything; otherwise the resolved title
    /// must contain it, case-insensitively. `limit` is clamped to 1..=1000.
    ///
    /// # Errors
    /// Returns error if the store cannot be queried.
    pub fn list_conversations(&self, search: &str, limit: usize) -> Result<Vec<ConversationSummary>> {
        let (conn, probe) = self.connect()?;
        let normalized = search.trim().to_lowercase();
        let pattern = format!("%{}%", escape_like(&normalized));
        let limit = limit.clamp(1, MAX_LIST_LIMIT);

        let title = title_expr(&probe);
        let text = text_column(&probe);
        let body = body_column(&probe, "m");
        let sql = format!(
            r"
            WITH latest AS (
              SELECT
                cmj.chat_id AS chat_id,
                {text} AS text,
                {body} AS body,
                m.date AS date,
                ROW_NUMBER() OVER (
                  PARTITION BY cmj.chat_id
                  ORDER BY m.date DESC, m.ROWID DESC
                ) AS rn
              FROM chat_message_join cmj
              JOIN message m ON m.ROWID = cmj.message_id
            )
            SELECT
              c.ROWID AS id,
              {title} AS title,
              latest.text AS snippet,
              latest.body AS body,
              COALESCE(latest.date, 0) AS raw_date
            FROM chat c
            LEFT JOIN latest ON latest.chat_id = c.ROWID AND latest.rn = 1
            WHERE (?1 = '' OR LOWER({title}) LIKE ?2 ESCAPE '\')
            ORDER BY raw_date DESC, c.ROWID DESC
            LIMIT ?3
            "
        );

        let mut stmt = conn.prepare(&sql).map_err(AppError::database)?;
        let rows = stmt
            .query_map(params![normalized, pattern, to_sql_limit(limit)], |row| {
                let id: i64 = row.get(0)?;
                let title: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
                let snippet = text_value(row, 2)?;
                let body = blob_value(row, 3)?;
                Ok(ConversationSummary {
                    id,
                    title: display_title(id, title),
                    snippet: preferred_text(snippet.as_deref(), body.as_deref())
                        .unwrap_or_default(),
                    timestamp: date_value(row, 4)?,
                    unread: false,
                })
            })
            .map_err(AppError::database)?;

        let summaries = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)?;

        tracing::debug!(count = summaries.len(), search = %normalized, "Listed conversations");
        Ok(summaries)
    }

    /// Loads one conversation with up to `limit` of its newest messages.
    ///
    /// `before` keeps only messages whose row id is strictly lower, for
    /// paging backwards. Messages are returned oldest first.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id, or an internal error if the
    /// store cannot be queried.
    pub fn get_conversation(
        &self,
        conversation_id: i64,
        limit: usize,
        before: Option<i64>,
    ) -> Result<ConversationThread> {
        let (conn, probe) = self.connect()?;
        let limit = limit.clamp(1, MAX_MESSAGE_LIMIT);

        let title = title_expr(&probe);
        let chat_title: Option<String> = conn
            .query_row(
                &format!("SELECT {title} FROM chat c WHERE c.ROWID = ?1"),
                [conversation_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(AppError::database)?
            .ok_or_else(|| AppError::not_found("Conversation not found"))?;

        let (sender, handle_join) = sender_expr(&probe);
        let participants = {
            let mut stmt = conn
                .prepare(&format!(
                    r"
                    SELECT DISTINCT {sender} AS participant
                    FROM chat_message_join cmj
                    JOIN message m ON m.ROWID = cmj.message_id
                    {handle_join}
                    WHERE cmj.chat_id = ?1
                    ORDER BY participant COLLATE NOCASE
                    "
                ))
                .map_err(AppError::database)?;
            let rows = stmt
                .query_map([conversation_id], |row| row.get::<_, String>(0))
                .map_err(AppError::database)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(AppError::database)?
        };

        let text = text_column(&probe);
        let body = body_column(&probe, "m");
        let mut stmt = conn
            .prepare(&format!(
                r"
                SELECT
                  m.ROWID AS id,
                  {text} AS text,
                  {body} AS body,
                  m.is_from_me AS is_from_me,
                  m.date AS raw_date,
                  {sender} AS sender
                FROM message m
                JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
                {handle_join}
                WHERE cmj.chat_id = ?1
                  AND (?2 IS NULL OR m.ROWID < ?2)
                ORDER BY m.date DESC, m.ROWID DESC
                LIMIT ?3
                "
            ))
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map(
                params![conversation_id, before, to_sql_limit(limit)],
                |row| {
                    let text = text_value(row, 1)?;
                    let body = blob_value(row, 2)?;
                    Ok(MessageRecord {
                        id: row.get(0)?,
                        text: preferred_text(text.as_deref(), body.as_deref()),
                        is_from_me: row.get::<_, Option<i64>>(3)?.unwrap_or(0) == 1,
                        timestamp: date_value(row, 4)?,
                        sender: row.get(5)?,
                        attachments: Vec::new(),
                    })
                },
            )
            .map_err(AppError::database)?;

        // newest first from the query; flip to chronological order
        let mut messages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)?;
        messages.reverse();

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        let mut attachments = load_attachments(&conn, &probe, &ids)?;
        for message in &mut messages {
            if let Some(found) = attachments.remove(&message.id) {
                message.attachments = found;
            }
        }

        tracing::debug!(
            conversation_id,
            messages = messages.len(),
            participants = participants.len(),
            "Loaded conversation"
        );

        Ok(ConversationThread {
            id: conversation_id,
            title: display_title(conversation_id, chat_title.unwrap_or_default()),
            participants,
            messages,
        })
    }
}

/// Fetches attachment metadata for `message_ids` in one query, grouped by
/// message in row order.
///
/// A failing lookup is fatal; only zero rows means "no attachments".
fn load_attachments(
    conn: &Connection,
    probe: &SchemaProbe,
    message_ids: &[i64],
) -> Result<HashMap<i64, Vec<AttachmentRecord>>> {
    if message_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; message_ids.len()].join(",");
    let filename = if probe.has_transfer_name() {
        "COALESCE(a.transfer_name, a.filename, 'attachment')"
    } else {
        "COALESCE(a.filename, 'attachment')"
    };
    let mime_type = if probe.attachment_columns.contains("mime_type") {
        "a.mime_type"
    } else {
        "NULL"
    };
    let sql = format!(
        r"
        SELECT
          maj.message_id AS message_id,
          {filename} AS filename,
          {mime_type} AS mime_type,
          a.filename AS path
        FROM message_attachment_join maj
        JOIN attachment a ON a.ROWID = maj.attachment_id
        WHERE maj.message_id IN ({placeholders})
        ORDER BY maj.message_id, a.ROWID
        "
    );

    let lookup_failed = |e: rusqlite::Error| {
        tracing::error!(error = %e, "Attachment lookup failed");
        AppError::internal("Attachment lookup failed")
    };

    let mut stmt = conn.prepare(&sql).map_err(lookup_failed)?;
    let rows = stmt
        .query_map(params_from_iter(message_ids.iter()), |row| {
            let message_id: i64 = row.get(0)?;
            Ok((
                message_id,
                AttachmentRecord {
                    filename: text_value(row, 1)?.unwrap_or_else(|| "attachment".to_string()),
                    mime_type: text_value(row, 2)?.filter(|s| !s.is_empty()),
                    path: text_value(row, 3)?.filter(|s| !s.is_empty()),
                },
            ))
        })
        .map_err(lookup_failed)?;

    let mut grouped: HashMap<i64, Vec<AttachmentRecord>> = HashMap::new();
    for row in rows {
        let (message_id, record) = row.map_err(lookup_failed)?;
        grouped.entry(message_id).or_default().push(record);
    }
    Ok(grouped)
}

/// SQL for the resolved chat title; empty string when nothing is set.
fn title_expr(probe: &SchemaProbe) -> String {
    let mut parts = Vec::with_capacity(4);
    for column in ["display_name", "chat_identifier", "guid"] {
        if probe.chat_columns.contains(column) {
            parts.push(format!("NULLIF(c.{column}, '')"));
        }
    }
    parts.push("''".to_string());
    format!("COALESCE({})", parts.join(", "))
}

/// SQL for the sender label and the join it needs.
fn sender_expr(probe: &SchemaProbe) -> (String, &'static str) {
    let has_handles =
        probe.handle_columns.contains("id") && probe.message_columns.contains("handle_id");
    if has_handles {
        (
            format!(
                "CASE WHEN m.is_from_me = 1 THEN '{SELF_SENDER}' \
                 ELSE COALESCE(NULLIF(h.id, ''), '{UNKNOWN_SENDER}') END"
            ),
            "LEFT JOIN handle h ON h.ROWID = m.handle_id",
        )
    } else {
        (
            format!(
                "CASE WHEN m.is_from_me = 1 THEN '{SELF_SENDER}' ELSE '{UNKNOWN_SENDER}' END"
            ),
            "",
        )
    }
}

fn text_column(probe: &SchemaProbe) -> &'static str {
    if probe.message_columns.contains("text") {
        "m.text"
    } else {
        "NULL"
    }
}

fn body_column(probe: &SchemaProbe, alias: &str) -> String {
    if probe.has_attributed_body() {
        format!("{alias}.attributedBody")
    } else {
        "NULL".to_string()
    }
}

fn display_title(id: i64, title: String) -> String {
    normalize(&title).unwrap_or_else(|| format!("Conversation {id}"))
}

/// Escapes `LIKE` wildcards so the search is a plain substring match.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Reads a TEXT or BLOB column as a string.
fn text_value(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null => None,
    })
}

fn blob_value(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) => Some(b.to_vec()),
        _ => None,
    })
}

/// Reads a store timestamp column (INTEGER or REAL) as a display string.
fn date_value(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => format_store_time(Some(i)),
        ValueRef::Real(f) => format_store_time_f64(f),
        _ => String::new(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builds small message stores for tests.

    use std::path::{Path, PathBuf};

    use rusqlite::{params, Connection};

    pub const SCHEMA: &str = r"
        CREATE TABLE chat (
          ROWID INTEGER PRIMARY KEY,
          guid TEXT,
          display_name TEXT,
          chat_identifier TEXT
        );
        CREATE TABLE message (
          ROWID INTEGER PRIMARY KEY,
          text TEXT,
          attributedBody BLOB,
          date INTEGER,
          is_from_me INTEGER,
          handle_id INTEGER
        );
        CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
        CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
        CREATE TABLE attachment (
          ROWID INTEGER PRIMARY KEY,
          filename TEXT,
          mime_type TEXT,
          transfer_name TEXT
        );
        CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
    ";

    /// A store with two chats:
    ///
    /// * chat 1 "Alice": messages 1..=3 (Alice, Me, Alice), message 2 has
    ///   two attachments.
    /// * chat 2 "" / identifier "+15550100": one message from an unknown
    ///   sender, older than chat 1's latest.
    pub fn build(dir: &Path) -> PathBuf {
        let path = dir.join("chat.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO chat VALUES (1, 'chat-guid-1', 'Alice', 'alice@example.com')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat VALUES (2, 'chat-guid-2', '', '+15550100')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO handle VALUES (1, 'alice@example.com')", [])
            .unwrap();

        let messages: &[(i64, Option<&str>, i64, i64, i64)] = &[
            (1, Some("hello"), 700_000_000_000_000_000, 0, 1),
            (2, Some("photos\nattached"), 700_000_060_000_000_000, 1, 0),
            (3, Some("nice"), 700_000_120_000_000_000, 0, 1),
            (4, Some("who is this"), 600_000_000, 0, 0),
        ];
        for (id, text, date, from_me, handle) in messages {
            conn.execute(
                "INSERT INTO message (ROWID, text, date, is_from_me, handle_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, text, date, from_me, handle],
            )
            .unwrap();
        }
        for (chat, message) in [(1, 1), (1, 2), (1, 3), (2, 4)] {
            conn.execute(
                "INSERT INTO chat_message_join VALUES (?1, ?2)",
                params![chat, message],
            )
            .unwrap();
        }

        conn.execute(
            "INSERT INTO attachment VALUES (1, '/nonexistent/IMG_0001.HEIC', 'image/heic', 'IMG_0001.HEIC')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO attachment VALUES (2, NULL, NULL, 'voice.caf')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO message_attachment_join VALUES (2, 1)", [])
            .unwrap();
        conn.execute("INSERT INTO message_attachment_join VALUES (2, 2)", [])
            .unwrap();

        path
    }
}
