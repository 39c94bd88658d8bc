//! Named-entry export packages.
//!
//! A package is a deflate-compressed zip archive holding `manifest.json`,
//! `transcript.json` and optional `attachments/...` entries. The archive is
//! only ever handled in memory and sealed with [`super::crypto`].

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::crypto::{decrypt_bytes, encrypt_bytes};
use super::secure_fs::{create_exclusive, ensure_private_dir};
use crate::domain::{AppError, Passphrase, Result};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const TRANSCRIPT_ENTRY: &str = "transcript.json";
pub const ATTACHMENTS_PREFIX: &str = "attachments/";
pub const MANIFEST_VERSION: u32 = 1;

/// One named entry; contents are wiped on drop.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub name: String,
    pub data: Zeroizing<Vec<u8>>,
}

impl PackageEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Zeroizing::new(data),
        }
    }
}

/// Ordered set of package entries.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<PackageEntry>,
}

impl Package {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry, replacing any existing entry with the same name.
    pub fn insert(&mut self, entry: PackageEntry) {
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the manifest entry.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the manifest is missing or malformed.
    pub fn manifest(&self) -> Result<PackageManifest> {
        let raw = self
            .get(MANIFEST_ENTRY)
            .ok_or_else(|| AppError::invalid("package has no manifest"))?;
        serde_json::from_slice(raw).map_err(|_| AppError::invalid("package manifest is malformed"))
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub version: u32,
    pub conversation_id: i64,
    pub message_count: usize,
    /// Entry name of the transcript.
    pub transcript: String,
    pub includes_attachments: bool,
}

impl PackageManifest {
    #[must_use]
    pub fn new(conversation_id: i64, message_count: usize, includes_attachments: bool) -> Self {
        Self {
            version: MANIFEST_VERSION,
            conversation_id,
            message_count,
            transcript: TRANSCRIPT_ENTRY.to_string(),
            includes_attachments,
        }
    }

    /// Pretty-printed manifest bytes.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(AppError::json)
    }
}

/// Serializes a package into zip bytes.
///
/// # Errors
/// Returns error if the archive cannot be written.
pub fn build_plain_package(package: &Package) -> Result<Zeroizing<Vec<u8>>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in package.entries() {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(AppError::archive)?;
        writer
            .write_all(&entry.data)
            .map_err(|e| AppError::io("Failed to write package entry", e))?;
    }

    let cursor = writer.finish().map_err(AppError::archive)?;
    Ok(Zeroizing::new(cursor.into_inner()))
}

/// Parses zip bytes back into a package.
///
/// # Errors
/// Returns error if the bytes are not a readable archive.
pub fn read_plain_package(bytes: &[u8]) -> Result<Package> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(AppError::archive)?;
    let mut package = Package::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(AppError::archive)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| AppError::io(format!("Failed to read package entry {name}"), e))?;
        package.insert(PackageEntry::new(name, data));
    }

    Ok(package)
}

/// Builds and encrypts a package into a container.
///
/// # Errors
/// Returns error if archiving or encryption fails.
pub fn encrypt_package(package: &Package, passphrase: &Passphrase) -> Result<Vec<u8>> {
    let plaintext = build_plain_package(package)?;
    Ok(encrypt_bytes(&plaintext, passphrase)?)
}

/// Decrypts a container and parses the package inside it.
///
/// # Errors
/// Returns error if decryption fails or the plaintext is not an archive.
pub fn decrypt_package(container: &[u8], passphrase: &Passphrase) -> Result<Package> {
    let plaintext = decrypt_bytes(container, passphrase)?;
    read_plain_package(&plaintext)
}

/// Relative path for an entry name, or `None` if it could leave the
/// extraction directory.
#[must_use]
pub fn entry_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Writes every entry beneath `dir` with owner-only permissions.
///
/// `dir` must be missing or empty. A missing directory is created `0o700`;
/// an existing one keeps its mode. Entries are created exclusively, so
/// nothing already on disk is replaced.
///
/// # Errors
/// Returns `InvalidRequest` for an entry name that escapes `dir` or an
/// output directory that is not empty, or an error if a directory or file
/// cannot be written.
pub fn extract_package(package: &Package, dir: &Path) -> Result<Vec<PathBuf>> {
    let relative: Vec<PathBuf> = package
        .entries()
        .iter()
        .map(|entry| {
            entry_path(&entry.name).ok_or_else(|| {
                AppError::invalid(format!("package entry name is unsafe: {}", entry.name))
            })
        })
        .collect::<Result<_>>()?;

    prepare_output_dir(dir)?;
    let mut written = Vec::with_capacity(relative.len());
    for (entry, rel) in package.entries().iter().zip(relative) {
        let target = dir.join(&rel);
        let mut current = dir.to_path_buf();
        if let Some(parent) = rel.parent() {
            for part in parent.components() {
                current.push(part);
                ensure_private_dir(&current)?;
            }
        }
        let mut file = create_exclusive(&target)?;
        file.write_all(&entry.data)
            .map_err(|e| AppError::io(format!("Failed to write {}", target.display()), e))?;
        written.push(target);
    }

    tracing::debug!(entries = written.len(), dir = %dir.display(), "Package extracted");
    Ok(written)
}

/// Creates `dir` if missing; otherwise it must be an empty plain directory.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.file_type().is_symlink() || !meta.is_dir() => Err(AppError::invalid(
            format!("{} exists and is not a plain directory", dir.display()),
        )),
        Ok(_) => {
            let mut entries = fs::read_dir(dir)
                .map_err(|e| AppError::io(format!("Failed to read {}", dir.display()), e))?;
            if entries.next().is_some() {
                return Err(AppError::invalid(format!(
                    "Output directory {} is not empty",
                    dir.display()
                )));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ensure_private_dir(dir),
        Err(e) => Err(AppError::io(format!("Failed to inspect {}", dir.display()), e)),
    }
}
