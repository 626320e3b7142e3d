// src/sync/backup.rs

//! Timestamped copies of the local save directories, taken at startup before
//! anything from the mirror is applied over them.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::GameEntry;
use crate::errors::Result;
use crate::fs::{copy_tree, FileSystem};
use crate::watch::path_utils::canonical_root;
use crate::watch::patterns::{collect_filtered_files, RootFilter};

/// Directory name format of one backup, e.g. `20240131_235959`.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn backup_timestamp(now: DateTime<Local>) -> String {
    now.format(BACKUP_TIMESTAMP_FORMAT).to_string()
}

/// Copy each game's filtered files into
/// `<backup_dir>/<timestamp>/<name>/<index>/`.
///
/// Games whose directory does not exist are skipped. Failing to create the
/// timestamp directory is an error; per-game and per-file failures are
/// logged. Returns the timestamp directory.
pub fn backup_local_state(
    fs: &dyn FileSystem,
    games: &[GameEntry],
    backup_dir: &Path,
    timestamp: &str,
) -> Result<PathBuf> {
    let ts_dir = backup_dir.join(timestamp);
    fs.create_dir_all(&ts_dir)?;

    for game in games {
        let root = canonical_root(fs, &game.path);
        if !fs.exists(&root) {
            info!(game = %game.label(), root = ?root, "save directory missing; skipping backup");
            continue;
        }

        let filter = match RootFilter::for_game(game) {
            Ok(filter) => filter,
            Err(err) => {
                warn!(game = %game.label(), error = %err, "invalid patterns; skipping backup");
                continue;
            }
        };
        let files = match collect_filtered_files(fs, &root, &filter) {
            Ok(files) => files,
            Err(err) => {
                warn!(game = %game.label(), root = ?root, error = %err, "scan failed; skipping backup");
                continue;
            }
        };

        let dest = game.subdir_in(&ts_dir);
        if let Err(err) = fs.create_dir_all(&dest) {
            warn!(game = %game.label(), dest = ?dest, error = %err, "cannot create backup directory");
            continue;
        }
        let copied = copy_tree(fs, &files, &root, &dest);
        info!(game = %game.label(), copied, "game backed up");
    }

    info!(dir = ?ts_dir, "backup complete");
    Ok(ts_dir)
}

/// Keep the newest `max_backups` directories under `backup_dir` and delete
/// the rest.
///
/// Newest means latest modification time, ties broken by the larger name
/// (timestamp names sort chronologically). Returns the removed directories.
pub fn prune_backups(fs: &dyn FileSystem, backup_dir: &Path, max_backups: usize) -> Vec<PathBuf> {
    if !fs.is_dir(backup_dir) {
        return Vec::new();
    }

    let entries = match fs.read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = ?backup_dir, error = %err, "cannot list backups");
            return Vec::new();
        }
    };

    let mut dirs: Vec<(i128, PathBuf)> = entries
        .into_iter()
        .filter(|p| fs.is_dir(p))
        .map(|p| {
            let mtime = fs.metadata(&p).map(|stat| stat.mtime_ns).unwrap_or(0);
            (mtime, p)
        })
        .collect();
    dirs.sort_by_key(|(mtime, path)| Reverse((*mtime, path.clone())));

    let total = dirs.len();
    let mut removed = Vec::new();
    for (_, dir) in dirs.into_iter().skip(max_backups) {
        match fs.remove_dir_all(&dir) {
            Ok(()) => {
                debug!(dir = ?dir, "old backup removed");
                removed.push(dir);
            }
            Err(err) => warn!(dir = ?dir, error = %err, "failed to remove old backup"),
        }
    }

    info!(
        dir = ?backup_dir,
        removed = removed.len(),
        kept = total - removed.len(),
        "backup cleanup done"
    );
    removed
}
