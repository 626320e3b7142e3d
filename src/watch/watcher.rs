// src/watch/watcher.rs

//! Polling directory watcher.
//!
//! Every `interval` the poll loop builds a fresh [`Snapshot`] of each root,
//! diffs it against the stored one and hands a [`ChangeSet`] to the callback
//! when anything moved. Scans run on the blocking pool; the root/snapshot
//! table lock is only held for map updates.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SaveSyncError};
use crate::fs::FileSystem;
use crate::types::WatcherState;
use crate::watch::path_utils::canonical_root;
use crate::watch::snapshot::{diff, Snapshot};

/// Lower bound on the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra time `release()` waits for the poll loop on top of one interval.
pub const RELEASE_GRACE: Duration = Duration::from_secs(1);

/// Changes observed under one root during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

/// Callback invoked from the poll loop. Keep it cheap: it runs inline on the
/// loop task. Errors and panics are logged and swallowed.
pub type ChangeCallback = Arc<dyn Fn(&ChangeSet) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct WatchTable {
    state: WatcherState,
    roots: Vec<PathBuf>,
    snapshots: HashMap<PathBuf, Snapshot>,
}

fn lock(table: &Mutex<WatchTable>) -> MutexGuard<'_, WatchTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Watcher {
    fs: Arc<dyn FileSystem>,
    interval: Duration,
    callback: ChangeCallback,
    table: Arc<Mutex<WatchTable>>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = lock(&self.table);
        f.debug_struct("Watcher")
            .field("interval", &self.interval)
            .field("state", &table.state)
            .field("roots", &table.roots)
            .finish()
    }
}

impl Watcher {
    /// Create an idle watcher over `roots`. Nothing is scanned until
    /// [`Watcher::start`].
    pub fn new<I, P>(
        fs: Arc<dyn FileSystem>,
        roots: I,
        interval: Duration,
        callback: ChangeCallback,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut canonical: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = canonical_root(fs.as_ref(), root.as_ref());
            if !canonical.contains(&root) {
                canonical.push(root);
            }
        }

        let (stop_tx, _stop_rx) = watch::channel(false);
        Self {
            fs,
            interval: interval.max(MIN_POLL_INTERVAL),
            callback,
            table: Arc::new(Mutex::new(WatchTable {
                roots: canonical,
                ..WatchTable::default()
            })),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> WatcherState {
        lock(&self.table).state
    }

    /// Canonical roots currently monitored, in insertion order.
    pub fn roots(&self) -> Vec<PathBuf> {
        lock(&self.table).roots.clone()
    }

    /// Take baseline snapshots of every root and launch the poll loop.
    ///
    /// Calling `start` on a running or paused watcher does nothing; starting
    /// a released watcher is an error.
    pub async fn start(&self) -> Result<()> {
        let roots = {
            let mut table = lock(&self.table);
            match table.state {
                WatcherState::Idle => {}
                WatcherState::Released => {
                    return Err(SaveSyncError::WatcherError(
                        "cannot start a released watcher".to_string(),
                    ));
                }
                WatcherState::Running | WatcherState::Paused => {
                    debug!(state = ?table.state, "watcher already started");
                    return Ok(());
                }
            }
            table.state = WatcherState::Running;
            table.roots.clone()
        };

        for root in &roots {
            match build_snapshot(Arc::clone(&self.fs), root.clone()).await {
                Ok(snapshot) => {
                    let mut table = lock(&self.table);
                    if table.roots.contains(root) {
                        table.snapshots.entry(root.clone()).or_insert(snapshot);
                    }
                }
                Err(err) => {
                    // No baseline yet; the first successful poll becomes one.
                    warn!(root = ?root, error = %err, "initial scan failed");
                }
            }
        }

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.fs),
            Arc::clone(&self.table),
            Arc::clone(&self.callback),
            self.interval,
            self.stop_tx.subscribe(),
        ));
        *self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        info!(
            roots = roots.len(),
            interval_ms = self.interval.as_millis() as u64,
            "watcher started"
        );
        Ok(())
    }

    /// Stop scanning and firing callbacks; the loop keeps its cadence.
    pub fn pause(&self) {
        let mut table = lock(&self.table);
        if table.state == WatcherState::Running {
            table.state = WatcherState::Paused;
            info!("watcher paused");
        } else {
            debug!(state = ?table.state, "pause ignored");
        }
    }

    pub fn resume(&self) {
        let mut table = lock(&self.table);
        if table.state == WatcherState::Paused {
            table.state = WatcherState::Running;
            info!("watcher resumed");
        } else {
            debug!(state = ?table.state, "resume ignored");
        }
    }

    /// Stop the poll loop and wait for it to exit, bounded by one interval
    /// plus [`RELEASE_GRACE`]. Releasing twice is a no-op.
    pub async fn release(&self) {
        {
            let mut table = lock(&self.table);
            if table.state == WatcherState::Released {
                return;
            }
            table.state = WatcherState::Released;
        }
        self.stop_tx.send_replace(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(mut handle) = handle {
            let bound = self.interval + RELEASE_GRACE;
            match tokio::time::timeout(bound, &mut handle).await {
                Ok(Ok(())) => debug!("poll loop joined"),
                Ok(Err(err)) => error!(error = %err, "poll loop ended abnormally"),
                Err(_) => {
                    warn!(
                        timeout_ms = bound.as_millis() as u64,
                        "poll loop did not stop in time; aborting it"
                    );
                    handle.abort();
                }
            }
        }
        info!("watcher released");
    }

    /// Start monitoring `root`.
    ///
    /// On a started watcher a baseline snapshot is taken first so the next
    /// poll does not report every existing file as created. Returns
    /// `Ok(false)` when the root is already monitored.
    pub async fn add_path(&self, root: impl AsRef<Path>) -> Result<bool> {
        let root = canonical_root(self.fs.as_ref(), root.as_ref());

        let state = {
            let table = lock(&self.table);
            if table.state == WatcherState::Released {
                return Err(SaveSyncError::WatcherError(format!(
                    "cannot add {} to a released watcher",
                    root.display()
                )));
            }
            if table.roots.contains(&root) {
                debug!(root = ?root, "root already watched");
                return Ok(false);
            }
            table.state
        };

        let baseline = if state == WatcherState::Idle {
            None
        } else {
            match build_snapshot(Arc::clone(&self.fs), root.clone()).await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(root = ?root, error = %err, "baseline scan failed");
                    None
                }
            }
        };

        let mut table = lock(&self.table);
        if table.roots.contains(&root) {
            debug!(root = ?root, "root added concurrently");
            return Ok(false);
        }
        table.roots.push(root.clone());
        if let Some(snapshot) = baseline {
            table.snapshots.insert(root.clone(), snapshot);
        }
        info!(root = ?root, "root added");
        Ok(true)
    }

    /// Stop monitoring `root`. Returns false if it was not monitored.
    pub fn remove_path(&self, root: impl AsRef<Path>) -> bool {
        let root = canonical_root(self.fs.as_ref(), root.as_ref());
        let mut table = lock(&self.table);
        let before = table.roots.len();
        table.roots.retain(|r| r != &root);
        if table.roots.len() == before {
            debug!(root = ?root, "remove ignored; root not watched");
            return false;
        }
        table.snapshots.remove(&root);
        info!(root = ?root, "root removed");
        true
    }
}

async fn build_snapshot(fs: Arc<dyn FileSystem>, root: PathBuf) -> anyhow::Result<Snapshot> {
    tokio::task::spawn_blocking(move || Snapshot::build(fs.as_ref(), &root))
        .await
        .map_err(|err| anyhow::anyhow!("snapshot task failed: {err}"))?
}

async fn poll_loop(
    fs: Arc<dyn FileSystem>,
    table: Arc<Mutex<WatchTable>>,
    callback: ChangeCallback,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("poll loop started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
        if *stop_rx.borrow() {
            break;
        }
        poll_once(&fs, &table, &callback).await;
    }
    debug!("poll loop finished");
}

async fn poll_once(
    fs: &Arc<dyn FileSystem>,
    table: &Arc<Mutex<WatchTable>>,
    callback: &ChangeCallback,
) {
    let roots = {
        let table = lock(table);
        if table.state != WatcherState::Running {
            return;
        }
        table.roots.clone()
    };

    for root in roots {
        let fresh = match build_snapshot(Arc::clone(fs), root.clone()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(root = ?root, error = %err, "scan failed; retrying next cycle");
                continue;
            }
        };

        let change = {
            let mut table = lock(table);
            if table.state != WatcherState::Running {
                return;
            }
            if !table.roots.contains(&root) {
                continue;
            }
            match table.snapshots.get(&root) {
                None => {
                    debug!(root = ?root, files = fresh.len(), "recorded baseline snapshot");
                    table.snapshots.insert(root.clone(), fresh);
                    continue;
                }
                Some(previous) => {
                    let d = diff(previous, &fresh);
                    if d.is_empty() {
                        continue;
                    }
                    ChangeSet {
                        root: root.clone(),
                        created: d.created,
                        modified: d.modified,
                        deleted: d.deleted,
                    }
                }
            }
        };

        debug!(
            root = ?root,
            created = change.created.len(),
            modified = change.modified.len(),
            deleted = change.deleted.len(),
            "changes detected"
        );

        match catch_unwind(AssertUnwindSafe(|| callback(&change))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(root = ?root, error = %err, "change callback failed"),
            Err(_) => error!(root = ?root, "change callback panicked"),
        }

        let mut table = lock(table);
        if table.roots.contains(&root) {
            table.snapshots.insert(root, fresh);
        }
    }
}
