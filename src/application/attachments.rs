//! Attachment collection for exports.
//!
//! Disk formats get a private `{stem}_attachments` directory next to the
//! destination; packages get the bytes embedded as `attachments/...`
//! entries. Both return the new location of every collected attachment,
//! keyed by `(message id, attachment index)`.
//!
//! Collection is best effort: a missing or non-regular source is skipped
//! and the export carries on with the original reference.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AttachmentRecord, ConversationThread, Result};
use crate::infrastructure::package::{PackageEntry, ATTACHMENTS_PREFIX};
use crate::infrastructure::paths::expand_home;
use crate::infrastructure::secure_fs::{ensure_private_dir, harden_dir, secure_copy};

/// `(message id, attachment index within the message)`.
pub type AttachmentKey = (i64, usize);

/// New attachment locations, by attachment.
pub type AttachmentRewrites = HashMap<AttachmentKey, String>;

/// Attachments read into memory for a package.
#[derive(Debug, Default)]
pub struct EmbeddedAttachments {
    pub rewrites: AttachmentRewrites,
    pub entries: Vec<PackageEntry>,
}

/// Directory that holds copied attachments for `destination`.
#[must_use]
pub fn attachments_dir(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination
        .parent()
        .unwrap_or_else(|| Path::new("/"))
        .join(format!("{stem}_attachments"))
}

/// `{message id}_{index}_{basename}`, with a generated basename when the
/// record has none.
#[must_use]
pub fn collision_safe_name(message_id: i64, index: usize, attachment: &AttachmentRecord) -> String {
    let basename = Path::new(&attachment.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("attachment_{message_id}_{index}"));
    format!("{message_id}_{index}_{basename}")
}

/// Resolves an attachment path to a regular file, if there is one.
fn regular_source(path: Option<&str>) -> Option<PathBuf> {
    let source = expand_home(Path::new(path?));
    fs::metadata(&source)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|_| source)
}

/// Iterates `(key, record)` over every attachment in the thread.
fn each_attachment(
    thread: &ConversationThread,
) -> impl Iterator<Item = (AttachmentKey, &AttachmentRecord)> {
    thread.messages.iter().flat_map(|message| {
        message
            .attachments
            .iter()
            .enumerate()
            .map(move |(index, record)| ((message.id, index), record))
    })
}

/// Copies every reachable attachment beside `destination`.
///
/// # Errors
/// Returns error if the attachment directory cannot be created or
/// hardened. Individual copy failures are logged and skipped.
pub fn copy_to_disk(thread: &ConversationThread, destination: &Path) -> Result<AttachmentRewrites> {
    let dir = attachments_dir(destination);
    ensure_private_dir(&dir)?;

    let mut rewrites = AttachmentRewrites::new();
    for ((message_id, index), record) in each_attachment(thread) {
        let Some(source) = regular_source(record.path.as_deref()) else {
            tracing::debug!(message_id, index, "Attachment source unavailable, skipping");
            continue;
        };

        let target = dir.join(collision_safe_name(message_id, index, record));
        match secure_copy(&source, &target) {
            Ok(bytes) => {
                tracing::debug!(message_id, index, bytes, "Copied attachment");
                rewrites.insert((message_id, index), target.to_string_lossy().into_owned());
            }
            Err(e) => {
                tracing::warn!(message_id, index, error = %e, "Failed to copy attachment, skipping");
            }
        }
    }

    harden_dir(&dir)?;
    tracing::info!(copied = rewrites.len(), dir = %dir.display(), "Attachments copied");
    Ok(rewrites)
}

/// Reads every reachable attachment into package entries.
#[must_use]
pub fn embed_in_package(thread: &ConversationThread) -> EmbeddedAttachments {
    let mut embedded = EmbeddedAttachments::default();
    for ((message_id, index), record) in each_attachment(thread) {
        let Some(source) = regular_source(record.path.as_deref()) else {
            tracing::debug!(message_id, index, "Attachment source unavailable, skipping");
            continue;
        };

        match fs::read(&source) {
            Ok(data) => {
                let name = format!(
                    "{ATTACHMENTS_PREFIX}{}",
                    collision_safe_name(message_id, index, record)
                );
                embedded.rewrites.insert((message_id, index), name.clone());
                embedded.entries.push(PackageEntry::new(name, data));
            }
            Err(e) => {
                tracing::warn!(message_id, index, error = %e, "Failed to read attachment, skipping");
            }
        }
    }
    embedded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRecord;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn attachment(filename: &str, path: Option<&Path>) -> AttachmentRecord {
        AttachmentRecord {
            filename: filename.to_string(),
            mime_type: None,
            path: path.map(|p| p.to_string_lossy().into_owned()),
        }
    }

    fn thread(attachments: Vec<AttachmentRecord>) -> ConversationThread {
        ConversationThread {
            id: 7,
            title: "Trip".to_string(),
            participants: vec!["Me".to_string()],
            messages: vec![MessageRecord {
                id: 42,
                timestamp: "2023-03-08 20:26".to_string(),
                sender: "Me".to_string(),
                text: Some("pics".to_string()),
                is_from_me: true,
                attachments,
            }],
        }
    }

    #[test]
    fn test_names() {
        let dest = Path::new("/tmp/exports/chat.json");
        assert_eq!(attachments_dir(dest), PathBuf::from("/tmp/exports/chat_attachments"));
        assert_eq!(
            collision_safe_name(42, 1, &attachment("../../etc/IMG.jpg", None)),
            "42_1_IMG.jpg"
        );
        assert_eq!(
            collision_safe_name(42, 0, &attachment("", None)),
            "42_0_attachment_42_0"
        );
        assert_eq!(
            collision_safe_name(42, 0, &attachment("..", None)),
            "42_0_attachment_42_0"
        );
    }

    #[test]
    fn test_copy_skips_missing_sources() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_1.jpg");
        fs::write(&source, b"jpeg").unwrap();
        let destination = dir.path().join("chat.txt");

        let thread = thread(vec![
            attachment("IMG_1.jpg", Some(&source)),
            attachment("gone.jpg", Some(&dir.path().join("gone.jpg"))),
            attachment("dir", Some(dir.path())),
            attachment("nopath.jpg", None),
        ]);

        let rewrites = copy_to_disk(&thread, &destination).unwrap();

        // missing, non-regular and path-less sources are expected to be skipped
        assert_eq!(rewrites.len(), 1);
        let copied = PathBuf::from(&rewrites[&(42, 0)]);
        assert_eq!(copied, dir.path().join("chat_attachments").join("42_0_IMG_1.jpg"));
        assert_eq!(fs::read(&copied).unwrap(), b"jpeg");

        let file_mode = fs::metadata(&copied).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(copied.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn test_shared_source_is_copied_per_attachment() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("shared.png");
        fs::write(&source, b"png").unwrap();

        let thread = thread(vec![
            attachment("shared.png", Some(&source)),
            attachment("shared.png", Some(&source)),
        ]);
        let rewrites = copy_to_disk(&thread, &dir.path().join("out.json")).unwrap();

        assert_eq!(rewrites.len(), 2);
        assert_ne!(rewrites[&(42, 0)], rewrites[&(42, 1)]);
    }

    #[test]
    fn test_embed_reads_into_entries() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("voice.caf");
        fs::write(&source, b"caf-bytes").unwrap();

        let thread = thread(vec![
            attachment("gone.caf", Some(&dir.path().join("gone.caf"))),
            attachment("voice.caf", Some(&source)),
        ]);
        let embedded = embed_in_package(&thread);

        assert_eq!(embedded.entries.len(), 1);
        assert_eq!(embedded.entries[0].name, "attachments/42_1_voice.caf");
        assert_eq!(embedded.entries[0].data.as_slice(), b"caf-bytes");
        assert_eq!(embedded.rewrites[&(42, 1)], "attachments/42_1_voice.caf");
        assert!(!embedded.rewrites.contains_key(&(42, 0)));
    }
}
