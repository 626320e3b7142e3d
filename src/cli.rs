// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{default_config_path, GitOverrides};

/// Command-line arguments for `savesync`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "savesync",
    version,
    about = "Keep game save directories in sync through a git mirror.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Remote URL; overrides `[git].remote`.
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    /// Access token for HTTPS remotes; overrides `[git].token`.
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Username paired with the token; overrides `[git].username`.
    #[arg(long, value_name = "NAME")]
    pub username: Option<String>,

    /// Branch to sync; overrides `[git].branch`.
    #[arg(long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SAVESYNC_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn git_overrides(&self) -> GitOverrides {
        GitOverrides {
            remote: self.remote.clone(),
            token: self.token.clone(),
            username: self.username.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
