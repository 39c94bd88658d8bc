//! Encrypted package export.

use std::path::Path;

use zeroize::Zeroizing;

use crate::domain::{AppError, Passphrase, Result};
use crate::infrastructure::package::{
    encrypt_package, Package, PackageEntry, PackageManifest, MANIFEST_ENTRY, TRANSCRIPT_ENTRY,
};

use super::{ExportView, FormatWriter, Rendered};

/// Bundles the transcript, manifest and embedded attachments, then seals
/// the archive.
pub struct PackageWriter {
    passphrase: Passphrase,
    attachments: Vec<PackageEntry>,
}

impl std::fmt::Debug for PackageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageWriter")
            .field("attachments", &self.attachments.len())
            .finish_non_exhaustive()
    }
}

impl PackageWriter {
    #[must_use]
    pub const fn new(passphrase: Passphrase, attachments: Vec<PackageEntry>) -> Self {
        Self {
            passphrase,
            attachments,
        }
    }

    /// Plain package for `view`, before encryption.
    ///
    /// # Errors
    /// Returns error if the transcript or manifest cannot be serialized.
    pub fn build(&self, view: &ExportView) -> Result<Package> {
        let mut package = Package::new();
        for entry in &self.attachments {
            package.insert(entry.clone());
        }

        let transcript = serde_json::to_vec_pretty(&view.thread).map_err(AppError::json)?;
        package.insert(PackageEntry::new(TRANSCRIPT_ENTRY, transcript));

        let manifest = PackageManifest::new(
            view.thread.id,
            view.message_count(),
            !self.attachments.is_empty(),
        );
        package.insert(PackageEntry::new(MANIFEST_ENTRY, manifest.to_bytes()?));
        Ok(package)
    }
}

impl FormatWriter for PackageWriter {
    fn render(&self, view: &ExportView, _destination: &Path) -> Result<Rendered> {
        let package = self.build(view)?;
        let sealed = encrypt_package(&package, &self.passphrase)?;
        tracing::debug!(entries = package.len(), "Package sealed");
        Ok(Rendered::Bytes(Zeroizing::new(sealed)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::view;
    use super::*;
    use crate::infrastructure::package::decrypt_package;

    #[test]
    fn test_package_round_trip() {
        let passphrase = Passphrase::new("correct horse");
        let writer = PackageWriter::new(
            passphrase.clone(),
            vec![PackageEntry::new("attachments/100_0_notes.pdf", b"%PDF".to_vec())],
        );

        let Rendered::Bytes(sealed) = writer.render(&view(), Path::new("/tmp/x.imexport")).unwrap()
        else {
            panic!("package writer must return bytes");
        };
        assert!(sealed.starts_with(b"IMEXPV1\0"));

        let package = decrypt_package(&sealed, &passphrase).unwrap();
        let mut names: Vec<&str> = package.names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["attachments/100_0_notes.pdf", "manifest.json", "transcript.json"]
        );
        assert_eq!(package.get("attachments/100_0_notes.pdf"), Some(&b"%PDF"[..]));

        let manifest = package.manifest().unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.conversation_id, 3);
        assert_eq!(manifest.message_count, 2);
        assert_eq!(manifest.transcript, "transcript.json");
        assert!(manifest.includes_attachments);

        let transcript: serde_json::Value =
            serde_json::from_slice(package.get("transcript.json").unwrap()).unwrap();
        assert_eq!(transcript["title"], "Book club");
    }

    #[test]
    fn test_manifest_without_attachments() {
        let writer = PackageWriter::new(Passphrase::new("correct horse"), Vec::new());
        let package = writer.build(&view()).unwrap();
        assert_eq!(package.len(), 2);
        assert!(!package.manifest().unwrap().includes_attachments);
    }
}
