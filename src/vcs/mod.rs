// src/vcs/mod.rs

//! Version control of the mirror directory.

pub mod git;

pub use git::{embed_credentials, redact, GitClient};

/// Operations the orchestrator needs from the mirror's version control.
///
/// All calls block and report success through the return value; failures
/// are logged by the implementation and never surface as panics.
pub trait VersionControl: Send + Sync {
    /// Whether a remote is configured. Without one the mirror is local-only
    /// and there is nothing to pull or push.
    fn has_remote(&self) -> bool {
        true
    }

    /// Make sure the mirror exists and is on the configured branch.
    fn ensure_ready(&self) -> bool;

    /// Replace the mirror's content with the remote branch.
    fn pull_latest(&self) -> bool;

    fn stage_all(&self) -> bool;

    /// Commit staged changes. Returns false when there was nothing to commit
    /// or the commit failed.
    fn commit(&self, message: &str) -> bool;

    fn push(&self) -> bool;
}
