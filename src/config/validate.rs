// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{AppConfig, RawConfigFile, MAX_POLL_INTERVAL_MINUTES};
use crate::errors::{Result, SaveSyncError};
use crate::watch::patterns::RootFilter;

impl TryFrom<RawConfigFile> for AppConfig {
    type Error = crate::errors::SaveSyncError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(AppConfig::new_unchecked(raw))
    }
}

/// Validate an already-built config (e.g. after CLI overrides were applied).
pub fn validate_config(cfg: &AppConfig) -> Result<()> {
    validate_git(&cfg.git.branch, cfg.git.repository_dir.as_os_str().is_empty())
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_games(cfg)?;
    validate_sync(cfg)?;
    validate_git(&cfg.git.branch, cfg.git.repository_dir.as_os_str().is_empty())?;
    validate_games(cfg)?;
    Ok(())
}

fn ensure_has_games(cfg: &RawConfigFile) -> Result<()> {
    if cfg.game.is_empty() {
        return Err(SaveSyncError::ConfigError(
            "config must contain at least one [[game]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_sync(cfg: &RawConfigFile) -> Result<()> {
    if cfg.sync.debounce_ms == 0 {
        return Err(SaveSyncError::ConfigError(
            "[sync].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    let minutes = cfg.sync.poll_interval_minutes;
    if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&minutes) {
        return Err(SaveSyncError::ConfigError(format!(
            "[sync].poll_interval_minutes must be between 1 and {MAX_POLL_INTERVAL_MINUTES} (got {minutes})"
        )));
    }
    Ok(())
}

fn validate_git(branch: &str, repository_dir_empty: bool) -> Result<()> {
    if branch.trim().is_empty() {
        return Err(SaveSyncError::ConfigError(
            "[git].branch must not be empty".to_string(),
        ));
    }
    if repository_dir_empty {
        return Err(SaveSyncError::ConfigError(
            "[git].repository_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_games(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for (pos, game) in cfg.game.iter().enumerate() {
        if game.name.trim().is_empty() {
            return Err(SaveSyncError::ConfigError(format!(
                "[[game]] entry #{} has an empty name",
                pos + 1
            )));
        }
        if game.path.as_os_str().is_empty() {
            return Err(SaveSyncError::ConfigError(format!(
                "game '{}' has an empty path",
                game.label()
            )));
        }
        if !seen.insert((game.name.as_str(), game.index.as_str())) {
            return Err(SaveSyncError::ConfigError(format!(
                "duplicate game entry '{}' (name + index must be unique)",
                game.label()
            )));
        }

        // Surface bad globs at load time rather than on the first scan.
        RootFilter::new(&game.allow, &game.deny).map_err(|err| {
            SaveSyncError::PatternError(format!("game '{}': {err:#}", game.label()))
        })?;
    }

    Ok(())
}
