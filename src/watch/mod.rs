// src/watch/mod.rs

//! Change detection for watched save directories.
//!
//! - [`snapshot`]: per-root file listings and their diff.
//! - [`watcher`]: the polling loop that turns snapshot diffs into callbacks.
//! - [`hash`]: the content hash used to confirm a change is real.
//! - [`patterns`]: allow/deny filtering of a root's files.

pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod snapshot;
pub mod watcher;

pub use hash::{compute_content_hash, scan_root, ContentHash, HashCache};
pub use patterns::{collect_filtered_files, RootFilter};
pub use snapshot::{diff, Snapshot, SnapshotDiff, SnapshotEntry};
pub use watcher::{ChangeCallback, ChangeSet, Watcher};
