// src/config/mod.rs

//! Configuration loading and validation for savesync.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like unique game entries and glob syntax
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    AppConfig, BackupSection, GameEntry, GeneralSection, GitOverrides, GitSection,
    LoggingSection, RawConfigFile, SyncSection,
};
pub use validate::validate_config;
