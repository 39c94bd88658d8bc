//! Permission-hardened filesystem primitives.
//!
//! Every file created here is `0o600`, every directory `0o700`. Final path
//! components are opened with `O_NOFOLLOW` so a symlink swapped in after
//! destination resolution makes the write fail instead of following it.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use rustix::fs::Access;

use crate::domain::{AppError, Result};

/// Owner read/write.
pub const FILE_PERMISSIONS: u32 = 0o600;
/// Owner read/write/execute.
pub const DIR_PERMISSIONS: u32 = 0o700;

/// Creates or truncates `path` and writes `content` with owner-only access.
///
/// The mode is re-applied through the open handle so a looser umask or a
/// pre-existing file's mode never survives.
///
/// # Errors
/// Returns error if the file cannot be opened, written or hardened.
pub fn secure_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_PERMISSIONS)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
        .map_err(|e| AppError::io(format!("Failed to open {}", path.display()), e))?;

    file.set_permissions(Permissions::from_mode(FILE_PERMISSIONS))
        .map_err(|e| AppError::io("Failed to harden file permissions", e))?;
    file.write_all(content)
        .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;
    file.sync_all()
        .map_err(|e| AppError::io("Failed to flush export file", e))?;

    Ok(())
}

/// Creates `path` exclusively with owner-only access.
///
/// # Errors
/// Returns error if the file already exists or cannot be created.
pub fn create_exclusive(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_PERMISSIONS)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
        .map_err(|e| AppError::io(format!("Failed to create {} exclusively", path.display()), e))?;
    file.set_permissions(Permissions::from_mode(FILE_PERMISSIONS))
        .map_err(|e| AppError::io("Failed to harden file permissions", e))?;
    Ok(file)
}

/// Copies `source` to `target` (created or truncated, never followed if it
/// is a symlink) with owner-only access. Returns the bytes copied.
///
/// # Errors
/// Returns error if either side cannot be opened or the copy fails.
pub fn secure_copy(source: &Path, target: &Path) -> Result<u64> {
    let mut input = File::open(source)
        .map_err(|e| AppError::io(format!("Failed to open {}", source.display()), e))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_PERMISSIONS)
        .custom_flags(libc::O_NOFOLLOW)
        .open(target)
        .map_err(|e| AppError::io(format!("Failed to open {}", target.display()), e))?;
    output
        .set_permissions(Permissions::from_mode(FILE_PERMISSIONS))
        .map_err(|e| AppError::io("Failed to harden file permissions", e))?;

    std::io::copy(&mut input, &mut output)
        .map_err(|e| AppError::io(format!("Failed to copy into {}", target.display()), e))
}

/// Sets owner-only file permissions on an existing path.
///
/// # Errors
/// Returns error if permissions cannot be changed.
pub fn harden_file(path: &Path) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(FILE_PERMISSIONS))
        .map_err(|e| AppError::io(format!("Failed to harden {}", path.display()), e))
}

/// Creates (if missing) a private directory and forces its mode to `0o700`.
///
/// # Errors
/// Returns error if the path exists as a non-directory or a symlink, or
/// cannot be created.
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() || !meta.is_dir() => {
            return Err(AppError::invalid(format!(
                "{} exists and is not a plain directory",
                path.display()
            )));
        }
        Ok(_) => {}
        Err(_) => {
            fs::DirBuilder::new()
                .mode(DIR_PERMISSIONS)
                .create(path)
                .map_err(|e| AppError::io(format!("Failed to create {}", path.display()), e))?;
        }
    }
    harden_dir(path)
}

/// Forces `0o700` on a directory.
///
/// # Errors
/// Returns error if permissions cannot be changed.
pub fn harden_dir(path: &Path) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(DIR_PERMISSIONS))
        .map_err(|e| AppError::io(format!("Failed to harden {}", path.display()), e))
}

/// Whether the current process may create entries in `dir`.
///
/// Uses `access(2)` with `W_OK | X_OK`, which honours the real uid, ACLs
/// and read-only mounts.
#[must_use]
pub fn is_writable_dir(dir: &Path) -> bool {
    rustix::fs::access(dir, Access::WRITE_OK | Access::EXEC_OK).is_ok()
}

/// Whether `path` itself is a symbolic link (without following it).
#[must_use]
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}
