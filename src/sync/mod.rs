// src/sync/mod.rs

//! Sync orchestration: when to pull, when to push, and what the two tasks
//! actually do.

pub mod actions;
pub mod backup;
pub mod orchestrator;

use std::path::PathBuf;

use crate::config::GameEntry;
use crate::errors::{Result, SaveSyncError};
use crate::fs::FileSystem;
use crate::watch::path_utils::canonical_root;
use crate::watch::patterns::RootFilter;

pub use actions::{commit_message, SyncActions};
pub use backup::{backup_local_state, backup_timestamp, prune_backups};
pub use orchestrator::{mirror_changed_roots, seed_hash_cache, SyncOrchestrator};

/// A configured game directory with its compiled filter.
#[derive(Debug, Clone)]
pub struct WatchedRoot {
    pub game: GameEntry,
    /// Canonical local directory (the configured path if it does not exist
    /// yet).
    pub root: PathBuf,
    pub filter: RootFilter,
}

impl WatchedRoot {
    pub fn from_game(fs: &dyn FileSystem, game: &GameEntry) -> Result<Self> {
        let filter = RootFilter::for_game(game)
            .map_err(|err| SaveSyncError::PatternError(format!("{err:#}")))?;
        Ok(Self {
            game: game.clone(),
            root: canonical_root(fs, &game.path),
            filter,
        })
    }

    pub fn from_games(fs: &dyn FileSystem, games: &[GameEntry]) -> Result<Vec<Self>> {
        games.iter().map(|game| Self::from_game(fs, game)).collect()
    }

    pub fn label(&self) -> String {
        self.game.label()
    }
}
