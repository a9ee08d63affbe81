use std::path::{Component, Path, PathBuf};

/// Canonical form of `path` when it exists, the path unchanged otherwise.
/// The Windows extended prefix (`\\?\`) added by `canonicalize` is removed.
pub fn normalize_path(path: &Path) -> PathBuf {
    match std::fs::canonicalize(path) {
        Ok(canonical) => strip_extended_path_prefix(canonical),
        Err(_) => path.to_path_buf(),
    }
}

/// Whether two paths name the same location, tolerating symlinked temp roots
/// such as `/var` -> `/private/var` on macOS.
pub fn paths_match(a: &Path, b: &Path) -> bool {
    a == b || normalize_path(a) == normalize_path(b)
}

/// True for a relative path that stays below its base directory.
pub fn is_contained_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(windows)]
fn strip_extended_path_prefix(path: PathBuf) -> PathBuf {
    let path_str = path.to_string_lossy();
    match path_str.strip_prefix(r"\\?\") {
        Some(stripped) => PathBuf::from(stripped),
        None => path,
    }
}

#[cfg(not(windows))]
fn strip_extended_path_prefix(path: PathBuf) -> PathBuf {
    path
}
