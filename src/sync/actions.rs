// src/sync/actions.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::WatchedRoot;
use crate::engine::{Task, TaskKind, TaskRunner};
use crate::fs::{copy_tree, walk_files, FileSystem};
use crate::vcs::VersionControl;
use crate::watch::patterns::collect_filtered_files;

/// Commit message for a push made by `device` at `now`.
pub fn commit_message(device: &str, now: DateTime<Local>) -> String {
    format!("sync by {device} at {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Copy `files` of `root` into its subdirectory of `mirror_dir`.
pub(crate) fn copy_into_mirror(
    fs: &dyn FileSystem,
    root: &WatchedRoot,
    files: &[PathBuf],
    mirror_dir: &Path,
) -> usize {
    let dest = root.game.subdir_in(mirror_dir);
    if let Err(err) = fs.create_dir_all(&dest) {
        warn!(game = %root.label(), dest = ?dest, error = %err, "cannot create mirror directory");
        return 0;
    }
    copy_tree(fs, files, &root.root, &dest)
}

/// What the pull and push queues actually run.
pub struct SyncActions {
    fs: Arc<dyn FileSystem>,
    vcs: Arc<dyn VersionControl>,
    roots: Arc<Vec<WatchedRoot>>,
    mirror_dir: PathBuf,
    device_id: String,
}

impl SyncActions {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        vcs: Arc<dyn VersionControl>,
        roots: Arc<Vec<WatchedRoot>>,
        mirror_dir: impl Into<PathBuf>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            fs,
            vcs,
            roots,
            mirror_dir: mirror_dir.into(),
            device_id: device_id.into(),
        }
    }

    /// Refresh the mirror from the remote, then overwrite each local save
    /// directory with its mirror copy. Does nothing for a local-only mirror.
    pub fn pull_apply(&self) -> Result<()> {
        if !self.vcs.has_remote() {
            debug!("local-only mirror; nothing to pull");
            return Ok(());
        }
        if !self.vcs.pull_latest() {
            bail!("pull failed; local saves left untouched this cycle");
        }

        for root in self.roots.iter() {
            let src = root.game.subdir_in(&self.mirror_dir);
            if !self.fs.is_dir(&src) {
                debug!(game = %root.label(), src = ?src, "nothing in mirror for game");
                continue;
            }

            let files = match walk_files(self.fs.as_ref(), &src) {
                Ok(files) => files,
                Err(err) => {
                    warn!(game = %root.label(), src = ?src, error = %err, "cannot list mirror files");
                    continue;
                }
            };
            if let Err(err) = self.fs.create_dir_all(&root.root) {
                warn!(game = %root.label(), root = ?root.root, error = %err, "cannot create save directory");
                continue;
            }
            let copied = copy_tree(self.fs.as_ref(), &files, &src, &root.root);
            info!(game = %root.label(), copied, "mirror applied to local saves");
        }
        Ok(())
    }

    /// Copy every local save directory into the mirror, commit and push.
    pub fn sync_push(&self) -> Result<()> {
        for root in self.roots.iter() {
            if !self.fs.exists(&root.root) {
                debug!(game = %root.label(), root = ?root.root, "save directory missing; skipping copy");
                continue;
            }
            match collect_filtered_files(self.fs.as_ref(), &root.root, &root.filter) {
                Ok(files) => {
                    let copied = copy_into_mirror(self.fs.as_ref(), root, &files, &self.mirror_dir);
                    debug!(game = %root.label(), copied, "local saves copied to mirror");
                }
                Err(err) => {
                    warn!(game = %root.label(), error = %err, "scan failed; game left out of this push");
                }
            }
        }

        if !self.vcs.stage_all() {
            bail!("staging failed");
        }
        let message = commit_message(&self.device_id, Local::now());
        if !self.vcs.commit(&message) {
            debug!("no new commit; pushing anyway in case the remote is behind");
        }
        if !self.vcs.has_remote() {
            debug!("local-only mirror; commit kept, nothing to push");
            return Ok(());
        }
        if !self.vcs.push() {
            bail!("push failed; retrying on the next trigger");
        }
        Ok(())
    }
}

impl TaskRunner for SyncActions {
    fn run(&self, task: &Task) -> Result<()> {
        match task.kind {
            TaskKind::PullApply => self.pull_apply(),
            TaskKind::SyncPush => self.sync_push(),
        }
    }
}
