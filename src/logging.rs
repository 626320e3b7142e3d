// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SAVESYNC_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Events go to stderr and to a daily log file in `[logging].log_dir`.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "SAVESYNC_LOG";
pub const LOG_FILE_PREFIX: &str = "savesync";

/// Keeps the background file writer alive; drop it last so buffered lines
/// reach the file.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup. At most `max_logs` daily files are kept
/// (pass [`crate::config::LoggingSection::retained_logs`]). If the log
/// directory cannot be set up we log to stderr only.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    log_dir: &Path,
    max_logs: usize,
) -> Result<LoggingGuard> {
    let level = resolve_level(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());
    let filter = LevelFilter::from_level(level);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (file_layer, guard, file_error) = match file_appender(log_dir, max_logs) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .with_filter(filter);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    registry().with(stderr_layer).with(file_layer).try_init()?;

    if let Some(err) = file_error {
        tracing::warn!(dir = ?log_dir, error = %err, "file logging disabled");
    }
    Ok(LoggingGuard { _file: guard })
}

fn file_appender(log_dir: &Path, max_logs: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(max_logs)
        .build(log_dir)?;
    Ok(appender)
}

/// Pick the level from the CLI flag, then the env value, then `info`.
pub fn resolve_level(cli_level: Option<LogLevel>, env_value: Option<&str>) -> tracing::Level {
    match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => env_value
            .and_then(parse_level_str)
            .unwrap_or(tracing::Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
