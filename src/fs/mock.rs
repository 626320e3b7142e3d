// src/fs/mock.rs

use super::{FileStat, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, mtime_ns: i128 },
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem for tests.
///
/// Every write without an explicit mtime gets a fresh, strictly increasing
/// timestamp so "file changed" is observable without sleeping.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    clock: Arc<Mutex<i128>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            clock: Arc::new(Mutex::new(1_000_000_000)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self) -> i128 {
        let mut clock = self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *clock += 1_000;
        *clock
    }

    /// Create or overwrite a file, stamping it with a new mtime.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mtime_ns = self.tick();
        self.add_file_with_mtime(path, content, mtime_ns);
    }

    /// Create or overwrite a file with an explicit mtime.
    pub fn add_file_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        mtime_ns: i128,
    ) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.entries();
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                mtime_ns,
            },
        );
        Self::link_into_parent(&mut files, &path);
    }

    /// Change a file's mtime without touching its content.
    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime_ns: i128) {
        if let Some(MockEntry::File { mtime_ns: m, .. }) = self.entries().get_mut(path.as_ref()) {
            *m = mtime_ns;
        }
    }

    /// Current content of a file, if it exists.
    pub fn content(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.entries().get(path.as_ref()) {
            Some(MockEntry::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.entries();
        if files.remove(path).is_some() {
            Self::unlink_from_parent(&mut files, path);
        }
    }

    fn parent_key(path: &Path) -> Option<PathBuf> {
        path.parent().map(|parent| {
            if parent.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                parent.to_path_buf()
            }
        })
    }

    fn link_into_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let Some(parent) = Self::parent_key(path) else {
            return;
        };
        if parent == path {
            return;
        }
        if !files.contains_key(&parent) {
            files.insert(parent.clone(), MockEntry::Dir(Vec::new()));
            Self::link_into_parent(files, &parent);
        }
        if let (Some(MockEntry::Dir(children)), Some(name)) =
            (files.get_mut(&parent), path.file_name().and_then(|n| n.to_str()))
        {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }

    fn unlink_from_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let Some(parent) = Self::parent_key(path) else {
            return;
        };
        if let (Some(MockEntry::Dir(children)), Some(name)) =
            (files.get_mut(&parent), path.file_name().and_then(|n| n.to_str()))
        {
            children.retain(|c| c != name);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entries().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::Dir(_)))
    }

    fn metadata(&self, path: &Path) -> Result<FileStat> {
        match self.entries().get(path) {
            Some(MockEntry::File { content, mtime_ns }) => Ok(FileStat {
                mtime_ns: *mtime_ns,
                size: content.len() as u64,
            }),
            Some(MockEntry::Dir(_)) => Ok(FileStat {
                mtime_ns: 0,
                size: 0,
            }),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.entries().get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let (content, mtime_ns) = match self.entries().get(from) {
            Some(MockEntry::File { content, mtime_ns }) => (content.clone(), *mtime_ns),
            _ => return Err(anyhow!("File not found: {:?}", from)),
        };
        self.add_file_with_mtime(to, content, mtime_ns);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        match files.get(path) {
            Some(MockEntry::Dir(_)) => Ok(()),
            Some(MockEntry::File { .. }) => Err(anyhow!("Is a file: {:?}", path)),
            None => {
                files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
                Self::link_into_parent(&mut files, path);
                Ok(())
            }
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        if !matches!(files.get(path), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        files.retain(|p, _| !p.starts_with(path));
        Self::unlink_from_parent(&mut files, path);
        Ok(())
    }
}
