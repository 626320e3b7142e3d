use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use blake3::Hasher;
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::watch::patterns::{collect_filtered_files, RootFilter};

/// Digest over the `(path, size, mtime)` tuples of a set of files.
///
/// This is an equality oracle only: it never reads file contents, so a
/// rewrite that keeps both size and mtime is invisible to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash of an empty file set.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Compute a deterministic hash over the metadata of the given files.
///
/// Order of `paths` does not matter; we sort them before hashing to keep the
/// hash stable. Files that cannot be stat'ed are logged and skipped.
pub fn compute_content_hash<I, P>(fs: &dyn FileSystem, paths: I) -> ContentHash
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut paths_vec: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    if paths_vec.is_empty() {
        return ContentHash::empty();
    }
    paths_vec.sort();

    let mut hasher = Hasher::new();
    for path in paths_vec {
        match fs.metadata(&path) {
            Ok(stat) => {
                hasher.update(path.to_string_lossy().as_bytes());
                hasher.update(&[0]);
                hasher.update(&stat.size.to_le_bytes());
                hasher.update(&stat.mtime_ns.to_le_bytes());
            }
            Err(err) => {
                warn!(path = ?path, error = %err, "stat failed; leaving file out of content hash");
            }
        }
    }

    let hash = ContentHash(hasher.finalize().to_hex().to_string());
    debug!(hash = %hash, "computed content hash");
    hash
}

/// Collect the filtered files of `root` and hash them in one go.
pub fn scan_root(
    fs: &dyn FileSystem,
    root: &Path,
    filter: &RootFilter,
) -> Result<(Vec<PathBuf>, ContentHash)> {
    let files = collect_filtered_files(fs, root, filter)?;
    let hash = compute_content_hash(fs, &files);
    Ok((files, hash))
}

/// Last known [`ContentHash`] per watched root.
///
/// Owned by a single task (the debounce loop), so it needs no lock.
#[derive(Debug, Default)]
pub struct HashCache {
    map: HashMap<PathBuf, ContentHash>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root: &Path) -> Option<&ContentHash> {
        self.map.get(root)
    }

    /// Store `hash` for `root`. Returns true if it differs from what was
    /// cached before (a missing entry counts as the empty hash).
    pub fn update(&mut self, root: &Path, hash: ContentHash) -> bool {
        let previous = self.map.get(root).cloned().unwrap_or_default();
        if previous == hash {
            return false;
        }
        debug!(root = ?root, old = %previous, new = %hash, "content hash changed");
        self.map.insert(root.to_path_buf(), hash);
        true
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
