/// What happens when a unique task is enqueued while another task with the
/// same key is still waiting in the queue.
///
/// - `Tail`: move the already-queued task to the end of the queue. The new
///   task is dropped; the queued one re-derives its work from current state
///   when it finally runs.
/// - `Fixed`: leave the queued task where it is and drop the new one.
///
/// Non-unique tasks ignore this setting and are always appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Tail,
    Fixed,
}

/// Lifecycle of a [`crate::watch::Watcher`].
///
/// `Idle -> Running -> (Paused <-> Running) -> Released`; `Released` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatcherState {
    #[default]
    Idle,
    Running,
    Paused,
    Released,
}
