// src/engine/queue.rs

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::task::{Task, TaskRunner};
use crate::types::InsertMode;

/// What `enqueue` did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task was added at the tail.
    Appended,
    /// A unique task with the same key was already pending and has been moved
    /// to the tail; the new task was dropped.
    MovedToTail,
    /// A unique task with the same key was already pending and kept its
    /// position; the new task was dropped.
    KeptInPlace,
}

/// Ordered pending tasks plus the index of unique keys among them.
///
/// Pure data structure; [`TaskQueue`] wraps it in a lock and drives a worker.
#[derive(Debug, Default)]
pub struct PendingTasks {
    order: VecDeque<Task>,
    unique_keys: HashSet<String>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert `task` according to its uniqueness flag and insert mode.
    pub fn push(&mut self, task: Task) -> EnqueueOutcome {
        if !task.unique {
            self.order.push_back(task);
            return EnqueueOutcome::Appended;
        }

        if self.unique_keys.insert(task.key.clone()) {
            self.order.push_back(task);
            return EnqueueOutcome::Appended;
        }

        match task.mode {
            InsertMode::Tail => {
                let position = self
                    .order
                    .iter()
                    .position(|queued| queued.unique && queued.key == task.key);
                match position.and_then(|idx| self.order.remove(idx)) {
                    Some(existing) => {
                        self.order.push_back(existing);
                        EnqueueOutcome::MovedToTail
                    }
                    None => {
                        // Index and list disagree; trust the new task.
                        warn!(key = %task.key, "unique key indexed but not queued; appending");
                        self.order.push_back(task);
                        EnqueueOutcome::Appended
                    }
                }
            }
            InsertMode::Fixed => EnqueueOutcome::KeptInPlace,
        }
    }

    pub fn pop_front(&mut self) -> Option<Task> {
        let task = self.order.pop_front()?;
        if task.unique {
            self.unique_keys.remove(&task.key);
        }
        Some(task)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter()
    }

    /// Keys of the pending tasks, head first.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().map(|t| t.key.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: PendingTasks,
    worker_running: bool,
}

struct Shared {
    name: String,
    state: Mutex<QueueState>,
    runner: Arc<dyn TaskRunner>,
    idle: Notify,
    handle: Handle,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A named work list drained by at most one worker at a time.
///
/// The worker is spawned lazily on the first enqueue into an idle queue and
/// retires as soon as it finds the list empty. Pending list and worker
/// liveness live under the same lock, so an insert racing with a retiring
/// worker always ends with either that worker or a fresh one picking the
/// task up.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TaskQueue")
            .field("name", &self.shared.name)
            .field("pending", &state.pending.keys())
            .field("worker_running", &state.worker_running)
            .finish()
    }
}

impl TaskQueue {
    /// Create an empty queue whose worker runs on `handle`.
    pub fn new(name: impl Into<String>, runner: Arc<dyn TaskRunner>, handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(QueueState::default()),
                runner,
                idle: Notify::new(),
                handle,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().pending.is_empty()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.shared.lock().pending.keys()
    }

    pub fn is_worker_running(&self) -> bool {
        self.shared.lock().worker_running
    }

    /// Add a task and make sure a worker will run it.
    pub fn enqueue(&self, task: Task) -> EnqueueOutcome {
        let key = task.key.clone();
        let (outcome, spawn_worker, pending) = {
            let mut state = self.shared.lock();
            let outcome = state.pending.push(task);
            let spawn_worker = !state.worker_running && !state.pending.is_empty();
            if spawn_worker {
                state.worker_running = true;
            }
            (outcome, spawn_worker, state.pending.len())
        };

        debug!(
            queue = %self.shared.name,
            task = %key,
            ?outcome,
            pending,
            "task enqueued"
        );

        if spawn_worker {
            let shared = Arc::clone(&self.shared);
            self.shared.handle.spawn(worker_loop(shared));
        }
        outcome
    }

    /// Wait until the queue is empty and no worker is active.
    ///
    /// Returns false if that did not happen within `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_idle();
            }
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        state.pending.is_empty() && !state.worker_running
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    debug!(queue = %shared.name, "worker started");

    loop {
        let task = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(task) => task,
                None => {
                    state.worker_running = false;
                    break;
                }
            }
        };

        info!(queue = %shared.name, task = %task.key, kind = %task.kind, "task started");

        let runner = Arc::clone(&shared.runner);
        let key = task.key.clone();
        let result = tokio::task::spawn_blocking(move || runner.run(&task)).await;

        match result {
            Ok(Ok(())) => info!(queue = %shared.name, task = %key, "task finished"),
            Ok(Err(err)) => warn!(queue = %shared.name, task = %key, error = %err, "task failed"),
            Err(err) if err.is_panic() => {
                error!(queue = %shared.name, task = %key, "task panicked")
            }
            Err(err) => error!(queue = %shared.name, task = %key, error = %err, "task aborted"),
        }
    }

    debug!(queue = %shared.name, "worker retired; queue empty");
    shared.idle.notify_waiters();
}
