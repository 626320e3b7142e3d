// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod sync;
pub mod types;
pub mod vcs;
pub mod watch;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, validate_config, AppConfig};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::sync::SyncOrchestrator;
use crate::vcs::{redact, GitClient, VersionControl};

/// Load the config named by `args`, apply the git overrides and validate the
/// result.
pub fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut cfg = load_and_validate(&args.config)?;
    cfg.apply_git_overrides(args.git_overrides());
    validate_config(&cfg)?;
    Ok(cfg)
}

/// High-level entry point used by `main.rs`.
///
/// Starts the orchestrator and keeps it running until Ctrl-C, then shuts it
/// down gracefully.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let cfg = Arc::new(cfg);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let vcs: Arc<dyn VersionControl> = Arc::new(GitClient::from_config(&cfg.git));

    let orchestrator = SyncOrchestrator::new(Arc::clone(&cfg), fs, vcs)?;
    if let Err(err) = orchestrator.start().await {
        orchestrator.shutdown().await;
        return Err(err);
    }
    info!(games = cfg.games.len(), "savesync running; press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    orchestrator.shutdown().await;
    signal?;
    Ok(())
}

/// Print the effective configuration (token redacted).
pub fn print_dry_run(cfg: &AppConfig) {
    let token = Some(cfg.git.token.as_str());
    println!("savesync dry-run");
    println!("  device_id = {}", cfg.general.effective_device_id());
    println!();

    println!("git:");
    println!("  remote = {}", redact(&cfg.git.remote, token));
    println!("  branch = {}", cfg.git.branch);
    println!("  repository_dir = {}", cfg.git.repository_dir.display());
    println!("  username = {}", cfg.git.username);
    println!(
        "  token = {}",
        if cfg.git.token.is_empty() { "<none>" } else { "***" }
    );
    println!();

    println!("sync:");
    println!("  poll_interval_minutes = {}", cfg.sync.poll_interval_minutes);
    println!("  debounce_ms = {}", cfg.sync.debounce_ms);
    println!("  watch_interval_ms = {}", cfg.sync.watch_interval().as_millis());
    println!();

    println!(
        "backup: dir = {}, max_backups = {}",
        cfg.backup.backup_dir.display(),
        cfg.backup.max_backups
    );
    println!(
        "logging: dir = {}, max_logs = {}",
        cfg.logging.log_dir.display(),
        cfg.logging.max_logs
    );
    println!();

    println!("games ({}):", cfg.games.len());
    for game in &cfg.games {
        println!("  - {}", game.label());
        println!("      path: {}", game.path.display());
        if !game.allow.is_empty() {
            println!("      allow: {:?}", game.allow);
        }
        if !game.deny.is_empty() {
            println!("      deny: {:?}", game.deny);
        }
    }

    debug!("dry-run complete (nothing started)");
}
