use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

use anyhow::bail;
use savesync::engine::{Task, TaskKind, TaskRunner};
use savesync::vcs::VersionControl;

#[derive(Default)]
struct RunnerState {
    started: Vec<String>,
    finished: Vec<String>,
    gate_closed: bool,
    fail_keys: HashSet<String>,
    panic_keys: HashSet<String>,
}

/// A fake task runner that:
/// - records the key of every task it starts and finishes
/// - can hold tasks at a gate so the rest of the queue stays pending
/// - can fail or panic on chosen keys.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    state: Arc<(Mutex<RunnerState>, Condvar)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every task after it is recorded as started until `open_gate`.
    pub fn close_gate(&self) {
        self.state.0.lock().unwrap().gate_closed = true;
    }

    pub fn open_gate(&self) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().gate_closed = false;
        cvar.notify_all();
    }

    pub fn fail_on(&self, key: &str) {
        self.state.0.lock().unwrap().fail_keys.insert(key.to_string());
    }

    pub fn panic_on(&self, key: &str) {
        self.state.0.lock().unwrap().panic_keys.insert(key.to_string());
    }

    pub fn started(&self) -> Vec<String> {
        self.state.0.lock().unwrap().started.clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.state.0.lock().unwrap().finished.clone()
    }

    pub fn count_started(&self, kind: TaskKind) -> usize {
        self.started()
            .iter()
            .filter(|k| k.as_str() == kind.default_key())
            .count()
    }
}

impl TaskRunner for RecordingRunner {
    fn run(&self, task: &Task) -> anyhow::Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.started.push(task.key.clone());
        while state.gate_closed {
            state = cvar.wait(state).unwrap();
        }

        if state.panic_keys.contains(&task.key) {
            drop(state);
            panic!("task {} panicked on purpose", task.key);
        }
        if state.fail_keys.contains(&task.key) {
            state.finished.push(task.key.clone());
            bail!("task {} failed on purpose", task.key);
        }
        state.finished.push(task.key.clone());
        Ok(())
    }
}

/// A fake version control client that records calls and returns configurable
/// results.
#[derive(Default)]
pub struct FakeVcs {
    calls: Mutex<Vec<String>>,
    fail_pull: Mutex<bool>,
    fail_push: Mutex<bool>,
    nothing_to_commit: Mutex<bool>,
    local_only: Mutex<bool>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_pull(self) -> Self {
        *self.fail_pull.lock().unwrap() = true;
        self
    }

    pub fn failing_push(self) -> Self {
        *self.fail_push.lock().unwrap() = true;
        self
    }

    pub fn with_nothing_to_commit(self) -> Self {
        *self.nothing_to_commit.lock().unwrap() = true;
        self
    }

    /// Behave like a mirror with no remote configured.
    pub fn without_remote(self) -> Self {
        *self.local_only.lock().unwrap() = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl VersionControl for FakeVcs {
    fn has_remote(&self) -> bool {
        !*self.local_only.lock().unwrap()
    }

    fn ensure_ready(&self) -> bool {
        self.record("ensure_ready");
        true
    }

    fn pull_latest(&self) -> bool {
        self.record("pull_latest");
        !*self.fail_pull.lock().unwrap()
    }

    fn stage_all(&self) -> bool {
        self.record("stage_all");
        true
    }

    fn commit(&self, message: &str) -> bool {
        self.record(format!("commit:{message}"));
        !*self.nothing_to_commit.lock().unwrap()
    }

    fn push(&self) -> bool {
        self.record("push");
        !*self.fail_push.lock().unwrap()
    }
}
