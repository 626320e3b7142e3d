// src/watch/snapshot.rs

//! Point-in-time file listings and the diff between two of them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::fs::{walk_files, FileStat, FileSystem};

/// Per-file record kept in a [`Snapshot`]: modification time and size.
pub type SnapshotEntry = FileStat;

/// Map of every regular file under a root to its [`SnapshotEntry`].
///
/// A snapshot is built fresh on each poll and never mutated afterwards; the
/// watcher swaps the whole value when a newer one is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, SnapshotEntry>,
}

impl Snapshot {
    /// Recursively record `(mtime, size)` for every file under `root`.
    ///
    /// - A missing `root` gives an empty snapshot.
    /// - Files that vanish or cannot be stat'ed mid-scan are logged and left
    ///   out.
    /// - An unreadable `root` is an error so the caller can retry later.
    pub fn build(fs: &dyn FileSystem, root: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for path in walk_files(fs, root)? {
            match fs.metadata(&path) {
                Ok(stat) => {
                    entries.insert(path, stat);
                }
                Err(err) => {
                    warn!(path = ?path, error = %err, "stat failed; leaving file out of snapshot");
                }
            }
        }

        debug!(root = ?root, files = entries.len(), "built snapshot");
        Ok(Self { entries })
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, SnapshotEntry)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&SnapshotEntry> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &SnapshotEntry)> {
        self.entries.iter()
    }
}

/// Result of comparing two snapshots of the same root. Each list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub created: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }
}

/// Partition the paths of `old` and `new` into created, modified and deleted.
///
/// A path counts as modified when it is present in both and its
/// `(mtime, size)` differs. Paths present in both with identical metadata
/// appear in none of the lists.
pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let mut out = SnapshotDiff::default();

    // BTreeMap iteration is ordered, so the lists come out sorted.
    for (path, entry) in &new.entries {
        match old.entries.get(path) {
            None => out.created.push(path.clone()),
            Some(prev) if prev != entry => out.modified.push(path.clone()),
            Some(_) => {}
        }
    }

    for path in old.entries.keys() {
        if !new.entries.contains_key(path) {
            out.deleted.push(path.clone());
        }
    }

    out
}
