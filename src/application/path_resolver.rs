//! Export destination resolution.
//!
//! Turns a caller-supplied path into the single file an export may create
//! or replace. Every rejection is an `InvalidRequest` with a specific reason.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::domain::{AppError, ExportFormat, Result};
use crate::infrastructure::paths::system_export_roots;
use crate::infrastructure::secure_fs::{is_symlink, is_writable_dir};

/// File stem used when the destination names a directory.
pub const DEFAULT_STEM: &str = "conversation";

/// Allow-list of directory trees exports may be written into.
#[derive(Debug, Clone)]
pub struct ExportSandbox {
    /// Roots as configured; may themselves contain system symlinks.
    roots: Vec<PathBuf>,
}

impl Default for ExportSandbox {
    fn default() -> Self {
        Self::system()
    }
}

impl ExportSandbox {
    /// The user's home directory and the system temporary directories.
    #[must_use]
    pub fn system() -> Self {
        Self::new(system_export_roots())
    }

    /// A sandbox over explicit roots.
    #[must_use]
    pub const fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether the canonical `path` lies beneath a canonicalized root.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| {
            let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
            path.starts_with(&canonical)
        })
    }

    /// A symlink on the way to a root (`/tmp -> /private/tmp`) is part of
    /// the system layout; any other link in a destination chain is not.
    fn tolerates_link(&self, link: &Path) -> bool {
        self.roots.iter().any(|root| root.starts_with(link))
    }

    fn has_untrusted_link(&self, dir: &Path) -> bool {
        dir.ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| is_symlink(p) && !self.tolerates_link(p))
    }

    /// Resolves `raw` into the destination file for `format`.
    ///
    /// Checks run in a fixed order: NUL bytes, absolute path, resolution,
    /// directory default name, forced extension, parent directory, existing
    /// directory, symlinked destination, symlinked ancestors, overwrite gate
    /// and finally the sandbox roots.
    ///
    /// # Errors
    /// Returns `InvalidRequest` naming the first failed check.
    pub fn resolve(&self, raw: &str, format: ExportFormat, overwrite: bool) -> Result<PathBuf> {
        if raw.contains('\0') {
            return Err(AppError::invalid(
                "destination_path contains an invalid byte",
            ));
        }
        // `~/...` is relative here; callers expand home shorthand first
        let raw_path = Path::new(raw);
        if !raw_path.is_absolute() {
            return Err(AppError::invalid("destination_path must be absolute"));
        }

        let extension = format.extension();
        let mut requested = normalize_lexically(raw_path);
        let mut destination = resolve_lenient(&requested);

        if destination.is_dir() {
            let name = format!("{DEFAULT_STEM}{extension}");
            destination.push(&name);
            requested.push(&name);
        }
        force_extension(&mut destination, extension);
        force_extension(&mut requested, extension);

        let parent = destination
            .parent()
            .filter(|p| p.is_dir())
            .ok_or_else(|| AppError::invalid("Destination directory does not exist"))?;
        if !is_writable_dir(parent) {
            return Err(AppError::invalid("Destination directory is not writable"));
        }

        let existing = fs::symlink_metadata(&destination).ok();
        if existing.as_ref().is_some_and(fs::Metadata::is_dir) {
            return Err(AppError::invalid("Destination path points to a directory"));
        }
        if is_symlink(&destination) || is_symlink(&requested) {
            return Err(AppError::invalid(
                "Symbolic links are not allowed for destination files",
            ));
        }
        if self.has_untrusted_link(parent)
            || requested.parent().is_some_and(|p| self.has_untrusted_link(p))
        {
            return Err(AppError::invalid(
                "Symbolic links are not allowed in destination directory path",
            ));
        }
        if existing.is_some() && !overwrite {
            return Err(AppError::invalid(
                "Destination file already exists and overwrite is disabled",
            ));
        }
        if !self.contains(&destination) {
            return Err(AppError::invalid(
                "Destination path is outside allowed export roots",
            ));
        }

        tracing::debug!(destination = %destination.display(), "Resolved export destination");
        Ok(destination)
    }
}

/// Resolves `raw` against the system sandbox.
///
/// # Errors
/// Returns `InvalidRequest` naming the first failed check.
pub fn resolve_destination(raw: &str, format: ExportFormat, overwrite: bool) -> Result<PathBuf> {
    ExportSandbox::system().resolve(raw, format, overwrite)
}

/// Removes `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalizes the longest existing prefix of `path` and re-appends the
/// missing tail.
fn resolve_lenient(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => return path.to_path_buf(),
        }
    }
}

/// Replaces the extension unless it already matches, ignoring case.
fn force_extension(path: &mut PathBuf, extension: &str) {
    let wanted = extension.trim_start_matches('.');
    let matches = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
    if !matches {
        path.set_extension(wanted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use std::os::unix::fs::symlink;
    use tempfile::{tempdir, TempDir};

    fn scratch() -> (TempDir, PathBuf, ExportSandbox) {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let sandbox = ExportSandbox::new(vec![base.clone()]);
        (dir, base, sandbox)
    }

    fn rejection(result: Result<PathBuf>) -> String {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        err.public_message()
    }

    fn s(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn test_plain_file_destination() {
        let (_dir, base, sandbox) = scratch();
        let resolved = sandbox
            .resolve(s(&base.join("out.json")), ExportFormat::Json, false)
            .unwrap();
        assert_eq!(resolved, base.join("out.json"));
    }

    #[test]
    fn test_rejects_nul_and_relative() {
        let (_dir, _base, sandbox) = scratch();
        assert!(rejection(sandbox.resolve("/tmp/a\0.json", ExportFormat::Json, false))
            .contains("invalid byte"));
        assert!(rejection(sandbox.resolve("out.json", ExportFormat::Json, false))
            .contains("absolute"));
    }

    #[test]
    fn test_home_shorthand_is_not_expanded() {
        let (_dir, _base, sandbox) = scratch();
        for raw in ["~/out.json", "~"] {
            assert_eq!(
                rejection(sandbox.resolve(raw, ExportFormat::Json, false)),
                "destination_path must be absolute"
            );
        }
    }

    #[test]
    fn test_directory_gets_default_name() {
        let (_dir, base, sandbox) = scratch();
        let resolved = sandbox.resolve(s(&base), ExportFormat::Sqlite, false).unwrap();
        assert_eq!(resolved, base.join("conversation.sqlite"));
    }

    #[test]
    fn test_extension_is_forced() {
        let (_dir, base, sandbox) = scratch();
        let forced = sandbox
            .resolve(s(&base.join("out.csv")), ExportFormat::Text, false)
            .unwrap();
        assert_eq!(forced, base.join("out.txt"));

        let bare = sandbox
            .resolve(s(&base.join("thread")), ExportFormat::EncryptedPackage, false)
            .unwrap();
        assert_eq!(bare, base.join("thread.imexport"));

        let upper = sandbox
            .resolve(s(&base.join("OUT.JSON")), ExportFormat::Json, false)
            .unwrap();
        assert_eq!(upper, base.join("OUT.JSON"));
    }

    #[test]
    fn test_dot_segments_are_resolved() {
        let (_dir, base, sandbox) = scratch();
        fs::create_dir(base.join("sub")).unwrap();
        let raw = format!("{}/sub/../out.json", base.display());
        assert_eq!(
            sandbox.resolve(&raw, ExportFormat::Json, false).unwrap(),
            base.join("out.json")
        );
    }

    #[test]
    fn test_missing_parent() {
        let (_dir, base, sandbox) = scratch();
        let message = rejection(sandbox.resolve(
            s(&base.join("missing").join("out.json")),
            ExportFormat::Json,
            false,
        ));
        assert_eq!(message, "Destination directory does not exist");
    }

    #[test]
    fn test_existing_directory_with_extension() {
        let (_dir, base, sandbox) = scratch();
        fs::create_dir(base.join("taken.json")).unwrap();
        // the directory itself is a valid target directory
        assert_eq!(
            sandbox
                .resolve(s(&base.join("taken.json")), ExportFormat::Json, false)
                .unwrap(),
            base.join("taken.json").join("conversation.json")
        );

        fs::create_dir(base.join("blocked.json")).unwrap();
        let message = rejection(sandbox.resolve(
            s(&base.join("blocked.csv")),
            ExportFormat::Json,
            true,
        ));
        assert_eq!(message, "Destination path points to a directory");
    }

    #[test]
    fn test_overwrite_gate() {
        let (_dir, base, sandbox) = scratch();
        let target = base.join("out.json");
        fs::write(&target, b"old").unwrap();

        let message = rejection(sandbox.resolve(s(&target), ExportFormat::Json, false));
        assert!(message.contains("overwrite is disabled"));
        assert_eq!(
            sandbox.resolve(s(&target), ExportFormat::Json, true).unwrap(),
            target
        );
    }

    #[test]
    fn test_symlinked_destination_is_rejected() {
        let (_dir, base, sandbox) = scratch();
        let real = base.join("real.json");
        fs::write(&real, b"{}").unwrap();
        let link = base.join("link.json");
        symlink(&real, &link).unwrap();

        let message = rejection(sandbox.resolve(s(&link), ExportFormat::Json, true));
        assert_eq!(message, "Symbolic links are not allowed for destination files");

        let dangling = base.join("dangling.json");
        symlink(base.join("nowhere.json"), &dangling).unwrap();
        assert!(sandbox.resolve(s(&dangling), ExportFormat::Json, true).is_err());
    }

    #[test]
    fn test_symlinked_ancestor_is_rejected() {
        let (_dir, base, sandbox) = scratch();
        let real = base.join("real");
        fs::create_dir(&real).unwrap();
        let link = base.join("link");
        symlink(&real, &link).unwrap();

        let message = rejection(sandbox.resolve(
            s(&link.join("out.json")),
            ExportFormat::Json,
            false,
        ));
        assert_eq!(
            message,
            "Symbolic links are not allowed in destination directory path"
        );
    }

    #[test]
    fn test_outside_sandbox_is_rejected() {
        let (_dir, base, _sandbox) = scratch();
        let inside = base.join("inside");
        let outside = base.join("outside");
        fs::create_dir(&inside).unwrap();
        fs::create_dir(&outside).unwrap();
        let sandbox = ExportSandbox::new(vec![inside.clone()]);

        assert!(sandbox
            .resolve(s(&inside.join("a.json")), ExportFormat::Json, false)
            .is_ok());
        let message = rejection(sandbox.resolve(
            s(&outside.join("a.json")),
            ExportFormat::Json,
            false,
        ));
        assert_eq!(message, "Destination path is outside allowed export roots");

        // traversal back out of the root is resolved before the check
        let sneaky = format!("{}/../outside/a.json", inside.display());
        assert!(sandbox.resolve(&sneaky, ExportFormat::Json, false).is_err());
    }

    #[test]
    fn test_system_sandbox_rejects_filesystem_root() {
        assert!(resolve_destination("/", ExportFormat::Json, true).is_err());
    }

    #[test]
    fn test_system_sandbox_accepts_temp_dir() {
        let dir = tempfile::Builder::new().tempdir_in(std::env::temp_dir()).unwrap();
        let target = dir.path().join("out.txt");
        let resolved = resolve_destination(s(&target), ExportFormat::Text, false).unwrap();
        assert_eq!(resolved.file_name(), target.file_name());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_lexically(Path::new("/../x")), PathBuf::from("/x"));
    }
}
