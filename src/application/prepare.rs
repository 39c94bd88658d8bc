//! Export view preparation.
//!
//! [`prepare`] builds the immutable copy of a conversation that writers
//! serialize: collected attachments point at their new location and paths
//! are redacted when the request asks for it. The caller's conversation is
//! never touched.

use crate::domain::{AttachmentRecord, ConversationThread, MessageRecord};

use super::attachments::AttachmentRewrites;

/// What a format writer gets to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportView {
    pub thread: ConversationThread,
}

impl ExportView {
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.thread.message_count()
    }
}

/// Builds the export view of `conversation`.
///
/// A rewritten attachment takes its new location; the rest keep their
/// original path. With `include_attachment_paths` off every path is
/// cleared, whatever was collected.
#[must_use]
pub fn prepare(
    conversation: &ConversationThread,
    rewrites: &AttachmentRewrites,
    include_attachment_paths: bool,
) -> ExportView {
    let messages = conversation
        .messages
        .iter()
        .map(|message| MessageRecord {
            attachments: message
                .attachments
                .iter()
                .enumerate()
                .map(|(index, attachment)| AttachmentRecord {
                    path: if include_attachment_paths {
                        rewrites
                            .get(&(message.id, index))
                            .cloned()
                            .or_else(|| attachment.path.clone())
                    } else {
                        None
                    },
                    ..attachment.clone()
                })
                .collect(),
            ..message.clone()
        })
        .collect();

    ExportView {
        thread: ConversationThread {
            messages,
            ..conversation.clone()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConversationThread {
        let attachment = |name: &str, path: &str| AttachmentRecord {
            filename: name.to_string(),
            mime_type: Some("image/jpeg".to_string()),
            path: Some(path.to_string()),
        };
        ConversationThread {
            id: 1,
            title: "Alice".to_string(),
            participants: vec!["Alice".to_string(), "Me".to_string()],
            messages: vec![
                MessageRecord {
                    id: 10,
                    timestamp: "2023-03-08 20:26".to_string(),
                    sender: "Alice".to_string(),
                    text: Some("hello".to_string()),
                    is_from_me: false,
                    attachments: vec![
                        attachment("a.jpg", "/src/a.jpg"),
                        attachment("b.jpg", "/src/b.jpg"),
                    ],
                },
                MessageRecord {
                    id: 11,
                    timestamp: "2023-03-08 20:27".to_string(),
                    sender: "Me".to_string(),
                    text: None,
                    is_from_me: true,
                    attachments: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_no_rewrites_keeps_everything() {
        let original = sample();
        let view = prepare(&original, &AttachmentRewrites::new(), true);
        assert_eq!(view.thread, original);
        assert_eq!(view.message_count(), 2);
    }

    #[test]
    fn test_rewrites_apply_per_attachment() {
        let original = sample();
        let mut rewrites = AttachmentRewrites::new();
        rewrites.insert((10, 1), "/out/chat_attachments/10_1_b.jpg".to_string());

        let view = prepare(&original, &rewrites, true);

        let attachments = &view.thread.messages[0].attachments;
        assert_eq!(attachments[0].path.as_deref(), Some("/src/a.jpg"));
        assert_eq!(
            attachments[1].path.as_deref(),
            Some("/out/chat_attachments/10_1_b.jpg")
        );
        assert_eq!(attachments[1].filename, "b.jpg");
    }

    #[test]
    fn test_redaction_clears_all_paths() {
        let original = sample();
        let mut rewrites = AttachmentRewrites::new();
        rewrites.insert((10, 0), "attachments/10_0_a.jpg".to_string());

        let view = prepare(&original, &rewrites, false);

        assert!(view
            .thread
            .messages
            .iter()
            .flat_map(|m| &m.attachments)
            .all(|a| a.path.is_none()));
        assert_eq!(view.thread.messages[0].attachments.len(), 2);
        // the source conversation is left as it was
        assert_eq!(original, sample());
    }
}
