//! Home-directory expansion and the export sandbox roots.

use std::path::{Component, Path, PathBuf};

/// Expands a leading `~` or `~/` to the current user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => dirs::home_dir().map_or_else(
            || path.to_path_buf(),
            |home| home.join(components.as_path()),
        ),
        _ => path.to_path_buf(),
    }
}

/// Roots an export destination must live under: the home directory and
/// the system temporary directories. Returned as configured, not resolved.
#[must_use]
pub fn system_export_roots() -> Vec<PathBuf> {
    let mut roots = Vec::with_capacity(3);
    if let Some(home) = dirs::home_dir() {
        roots.push(home);
    }
    for candidate in [PathBuf::from("/tmp"), std::env::temp_dir()] {
        if !roots.contains(&candidate) {
            roots.push(candidate);
        }
    }
    roots
}
