// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Floor applied to the watcher poll interval.
pub const MIN_WATCH_INTERVAL_MS: u64 = 100;

/// Upper bound on `[sync].poll_interval_minutes` (one week).
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Default lower bound for the watcher poll interval when it is derived from
/// `debounce_ms`.
pub const DEFAULT_WATCH_INTERVAL_FLOOR_MS: u64 = 300;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [general]
/// device_id = "desktop"
///
/// [git]
/// remote = "https://example.com/saves.git"
/// branch = "main"
///
/// [sync]
/// poll_interval_minutes = 15
/// debounce_ms = 1500
///
/// [[game]]
/// name = "Celeste"
/// index = "index0"
/// path = "/home/me/.local/share/Celeste/Saves"
/// allow = ["*.celeste"]
/// ```
///
/// Every section is optional and falls back to defaults. Use
/// `AppConfig::try_from(raw)` to get a validated configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub general: GeneralSection,

    #[serde(default)]
    pub git: GitSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub backup: BackupSection,

    #[serde(default)]
    pub logging: LoggingSection,

    /// All `[[game]]` entries, in file order.
    #[serde(default)]
    pub game: Vec<GameEntry>,
}

/// Validated configuration.
///
/// Built once at startup and shared by `Arc`; nothing mutates it afterwards
/// except CLI overrides applied before the orchestrator starts.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub general: GeneralSection,
    pub git: GitSection,
    pub sync: SyncSection,
    pub backup: BackupSection,
    pub logging: LoggingSection,
    pub games: Vec<GameEntry>,
}

impl AppConfig {
    /// Construct without running validation. Callers go through
    /// `TryFrom<RawConfigFile>` instead.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            general: raw.general,
            git: raw.git,
            sync: raw.sync,
            backup: raw.backup,
            logging: raw.logging,
            games: raw.game,
        }
    }

    /// Apply command-line overrides for the git section. `None` keeps the
    /// value from the file.
    pub fn apply_git_overrides(&mut self, overrides: GitOverrides) {
        if let Some(remote) = overrides.remote {
            self.git.remote = remote;
        }
        if let Some(token) = overrides.token {
            self.git.token = token;
        }
        if let Some(username) = overrides.username {
            self.git.username = username;
        }
        if let Some(branch) = overrides.branch {
            self.git.branch = branch;
        }
    }
}

/// Values from the command line that take precedence over `[git]`.
#[derive(Debug, Clone, Default)]
pub struct GitOverrides {
    pub remote: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub branch: Option<String>,
}

/// `[general]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralSection {
    /// Name of this machine, used in commit messages.
    #[serde(default)]
    pub device_id: String,
}

impl GeneralSection {
    pub fn effective_device_id(&self) -> &str {
        let trimmed = self.device_id.trim();
        if trimmed.is_empty() { "device" } else { trimmed }
    }
}

/// `[git]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GitSection {
    /// Remote URL. Empty means a local-only mirror: pull and push are skipped.
    #[serde(default)]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Working tree of the mirror.
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,

    /// Access token embedded into HTTPS remotes. Never logged.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub username: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("./repository")
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            remote: String::new(),
            branch: default_branch(),
            repository_dir: default_repository_dir(),
            token: String::new(),
            username: String::new(),
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// How often the remote is pulled and applied locally.
    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u64,

    /// Debounce window for local change detection.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Watcher poll interval. Defaults to `max(300, debounce_ms)`.
    #[serde(default)]
    pub watch_interval_ms: Option<u64>,
}

fn default_poll_interval_minutes() -> u64 {
    15
}

fn default_debounce_ms() -> u64 {
    1500
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            poll_interval_minutes: default_poll_interval_minutes(),
            debounce_ms: default_debounce_ms(),
            watch_interval_ms: None,
        }
    }
}

impl SyncSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.saturating_mul(60))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Effective watcher poll interval; this is the upper bound on how long a
    /// local change can go unnoticed.
    pub fn watch_interval(&self) -> Duration {
        let ms = self
            .watch_interval_ms
            .unwrap_or_else(|| self.debounce_ms.max(DEFAULT_WATCH_INTERVAL_FLOOR_MS));
        Duration::from_millis(ms.max(MIN_WATCH_INTERVAL_MS))
    }
}

/// `[backup]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupSection {
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Number of timestamped backups to keep.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backup")
}

fn default_max_backups() -> usize {
    20
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            max_backups: default_max_backups(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Number of daily log files to keep. `0` is treated as `1`.
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_logs() -> usize {
    1000
}

impl LoggingSection {
    /// How many log files the rolling appender keeps; never less than one.
    pub fn retained_logs(&self) -> usize {
        self.max_logs.max(1)
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_logs: default_max_logs(),
        }
    }
}

/// One `[[game]]` entry: a local save directory to keep in sync.
#[derive(Debug, Clone, Deserialize)]
pub struct GameEntry {
    /// Game name; entries with the same name share `<mirror>/<name>/`.
    pub name: String,

    /// Distinguishes entries that share a name (e.g. `index0`, `index1`).
    #[serde(default)]
    pub index: String,

    /// Local save directory.
    pub path: PathBuf,

    /// Glob patterns (relative to `path`) of files to sync. Empty = all.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Glob patterns (relative to `path`) of files to ignore.
    #[serde(default)]
    pub deny: Vec<String>,
}

impl GameEntry {
    /// Directory inside `base` (mirror or backup snapshot) that holds this
    /// entry's files.
    pub fn subdir_in(&self, base: &Path) -> PathBuf {
        let dir = base.join(&self.name);
        if self.index.is_empty() {
            dir
        } else {
            dir.join(&self.index)
        }
    }

    /// `name` or `name/index`, for log lines.
    pub fn label(&self) -> String {
        if self.index.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, self.index)
        }
    }
}
