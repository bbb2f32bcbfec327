//! Project identity from tracked directories.

use std::path::{Path, PathBuf};

/// Resolves the project root for a file.
///
/// The project is the longest tracked directory containing the file, compared
/// component-wise. Files outside every tracked directory fall back to their
/// containing directory.
pub fn resolve_project_root(file: &Path, directories: &[PathBuf]) -> PathBuf {
    directories
        .iter()
        .filter(|dir| file.starts_with(dir))
        .max_by_key(|dir| dir.components().count())
        .cloned()
        .or_else(|| file.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| file.to_path_buf())
}

/// Short display name for a project root: its last path component.
pub fn project_name(root: &str) -> String {
    Path::new(root)
        .file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| root.to_string(), String::from)
}
