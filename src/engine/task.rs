// src/engine/task.rs

use std::fmt;

use crate::types::InsertMode;

/// The closed set of operations a queue can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Refresh the mirror from the remote and copy it over the local roots.
    PullApply,
    /// Copy the local roots into the mirror, commit and push.
    SyncPush,
}

impl TaskKind {
    /// Dedup key used when the orchestrator enqueues this kind.
    pub fn default_key(self) -> &'static str {
        match self {
            TaskKind::PullApply => "pull_apply",
            TaskKind::SyncPush => "sync_push",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_key())
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub key: String,
    /// At most one pending task per key when set.
    pub unique: bool,
    pub mode: InsertMode,
}

impl Task {
    pub fn new(kind: TaskKind, key: impl Into<String>, unique: bool, mode: InsertMode) -> Self {
        Self {
            kind,
            key: key.into(),
            unique,
            mode,
        }
    }

    /// Unique `pull_apply` task with tail insertion.
    pub fn pull_apply() -> Self {
        Self::new(
            TaskKind::PullApply,
            TaskKind::PullApply.default_key(),
            true,
            InsertMode::Tail,
        )
    }

    /// Unique `sync_push` task with tail insertion.
    pub fn sync_push() -> Self {
        Self::new(
            TaskKind::SyncPush,
            TaskKind::SyncPush.default_key(),
            true,
            InsertMode::Tail,
        )
    }
}

/// Executes tasks popped by a [`crate::engine::TaskQueue`] worker.
///
/// `run` is called on tokio's blocking pool, one task at a time per queue,
/// so implementations may do slow synchronous I/O. Errors and panics are
/// logged by the worker and never stop the queue.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(&self, task: &Task) -> anyhow::Result<()>;
}
