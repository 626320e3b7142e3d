#![allow(dead_code)]

use std::path::{Path, PathBuf};

use savesync::config::{AppConfig, GameEntry, RawConfigFile};

/// Builder for `AppConfig` to simplify test setup.
///
/// Starts from the file defaults with every directory placed under `base`
/// and a fast debounce/poll cadence.
pub struct AppConfigBuilder {
    config: RawConfigFile,
}

impl AppConfigBuilder {
    pub fn new(base: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.git.repository_dir = base.join("repository");
        config.backup.backup_dir = base.join("backup");
        config.logging.log_dir = base.join("logs");
        config.sync.debounce_ms = 150;
        config.sync.watch_interval_ms = Some(100);
        config.general.device_id = "test-device".to_string();
        Self { config }
    }

    pub fn with_game(mut self, game: GameEntry) -> Self {
        self.config.game.push(game);
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.debounce_ms = ms;
        self
    }

    pub fn with_watch_interval_ms(mut self, ms: u64) -> Self {
        self.config.sync.watch_interval_ms = Some(ms);
        self
    }

    pub fn with_poll_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.poll_interval_minutes = minutes;
        self
    }

    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.config.backup.max_backups = max;
        self
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.config.git.remote = remote.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> AppConfig {
        AppConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for a `[[game]]` entry.
pub struct GameEntryBuilder {
    game: GameEntry,
}

impl GameEntryBuilder {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            game: GameEntry {
                name: name.to_string(),
                index: String::new(),
                path: path.into(),
                allow: vec![],
                deny: vec![],
            },
        }
    }

    pub fn index(mut self, index: &str) -> Self {
        self.game.index = index.to_string();
        self
    }

    pub fn allow(mut self, pattern: &str) -> Self {
        self.game.allow.push(pattern.to_string());
        self
    }

    pub fn deny(mut self, pattern: &str) -> Self {
        self.game.deny.push(pattern.to_string());
        self
    }

    pub fn build(self) -> GameEntry {
        self.game
    }
}
