// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

use crate::fs::FileSystem;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if `path` is not located under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Resolve a configured root to the stable path used as its identity.
///
/// Existing directories are canonicalized (symlinks and `..` resolved, which
/// matters on platforms like macOS where `/var` is really `/private/var`).
/// Roots that do not exist yet keep their configured path.
pub fn canonical_root(fs: &dyn FileSystem, root: &Path) -> PathBuf {
    fs.canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}
