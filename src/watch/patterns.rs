// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::GameEntry;
use crate::fs::{walk_files, FileSystem};
use crate::watch::path_utils::relative_str;

/// Compiled allow/deny glob patterns for one watched root.
///
/// Patterns are matched against the path relative to the root with forward
/// slashes (e.g. `"slot1/save.dat"`). `*` also matches `/`, so `"*.sav"`
/// catches save files at any depth.
///
/// - An empty allow list allows every file.
/// - Deny wins over allow.
#[derive(Clone)]
pub struct RootFilter {
    allow_set: Option<GlobSet>,
    deny_set: Option<GlobSet>,
}

impl fmt::Debug for RootFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootFilter")
            .field("has_allow", &self.allow_set.is_some())
            .field("has_deny", &self.deny_set.is_some())
            .finish()
    }
}

impl RootFilter {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self> {
        let allow_set = if allow.is_empty() {
            None
        } else {
            Some(build_globset(allow).context("building allow globset")?)
        };

        let deny_set = if deny.is_empty() {
            None
        } else {
            Some(build_globset(deny).context("building deny globset")?)
        };

        Ok(Self {
            allow_set,
            deny_set,
        })
    }

    /// Filter that accepts every file.
    pub fn allow_all() -> Self {
        Self {
            allow_set: None,
            deny_set: None,
        }
    }

    /// Compile the filter for a configured game entry.
    pub fn for_game(game: &GameEntry) -> Result<Self> {
        Self::new(&game.allow, &game.deny)
            .with_context(|| format!("building filter for game {}", game.label()))
    }

    /// Returns true if the file at `rel_path` (relative to the root) should be
    /// synced.
    pub fn matches(&self, rel_path: &str) -> bool {
        if let Some(allow) = &self.allow_set {
            if !allow.is_match(rel_path) {
                return false;
            }
        }
        if let Some(deny) = &self.deny_set {
            if deny.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect all files under `root` that pass `filter`, sorted by path.
///
/// A missing root yields an empty list.
pub fn collect_filtered_files(
    fs: &dyn FileSystem,
    root: &Path,
    filter: &RootFilter,
) -> Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = walk_files(fs, root)?
        .into_iter()
        .filter(|path| match relative_str(root, path) {
            Some(rel) => filter.matches(&rel),
            None => false,
        })
        .collect();

    debug!(root = ?root, count = files.len(), "collected filtered files");
    Ok(files)
}
