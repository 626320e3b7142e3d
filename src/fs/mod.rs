// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub mod mock;

/// The two pieces of metadata the snapshot engine and the content hash care
/// about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileStat {
    /// Modification time in nanoseconds since the Unix epoch (negative for
    /// pre-epoch timestamps).
    pub mtime_ns: i128,
    pub size: u64,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn metadata(&self, path: &Path) -> Result<FileStat>;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Copy a single file, overwriting `to` and keeping the source
    /// modification time. The parent of `to` must exist.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn metadata(&self, path: &Path) -> Result<FileStat> {
        let meta = fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
        let modified = meta
            .modified()
            .with_context(|| format!("reading mtime of {:?}", path))?;
        Ok(FileStat {
            mtime_ns: system_time_to_ns(modified),
            size: meta.len(),
        })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to).with_context(|| format!("copying {:?} -> {:?}", from, to))?;

        let modified = fs::metadata(from)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {:?}", from))?;
        let dest = fs::OpenOptions::new()
            .write(true)
            .open(to)
            .with_context(|| format!("opening {:?} to set mtime", to))?;
        dest.set_modified(modified)
            .with_context(|| format!("setting mtime on {:?}", to))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).with_context(|| format!("removing dir {:?}", path))
    }
}

fn system_time_to_ns(t: SystemTime) -> i128 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    }
}

/// Recursively list every regular file under `root`.
///
/// A missing `root` yields an empty list. An unreadable `root` is an error;
/// unreadable subdirectories are logged and skipped.
pub fn walk_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    if !fs.exists(root) {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if dir == root => return Err(err),
            Err(err) => {
                warn!(dir = ?dir, error = %err, "skipping unreadable directory");
                continue;
            }
        };

        for path in entries {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Copy `files` (all located under `source_root`) into `dest_root`, keeping
/// their paths relative to `source_root`.
///
/// Missing destination directories are created and existing files are
/// overwritten. A failure on one file is logged and skipped; the rest of the
/// batch still runs. Returns the number of files copied.
pub fn copy_tree(
    fs: &dyn FileSystem,
    files: &[PathBuf],
    source_root: &Path,
    dest_root: &Path,
) -> usize {
    let mut copied = 0;

    for file in files {
        let rel = match file.strip_prefix(source_root) {
            Ok(rel) => rel,
            Err(_) => {
                warn!(
                    file = ?file,
                    root = ?source_root,
                    "file is not under source root; skipping copy"
                );
                continue;
            }
        };
        let target = dest_root.join(rel);

        let result = match target.parent() {
            Some(parent) => fs.create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| fs.copy_file(file, &target));

        match result {
            Ok(()) => copied += 1,
            Err(err) => {
                warn!(
                    src = ?file,
                    dst = ?target,
                    error = %err,
                    "copy failed; skipping file"
                );
            }
        }
    }

    debug!(
        copied,
        total = files.len(),
        src = ?source_root,
        dst = ?dest_root,
        "copy_tree finished"
    );
    copied
}
