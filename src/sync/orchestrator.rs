// src/sync/orchestrator.rs

//! Ties the watcher, the content-hash gate and the two task queues together.
//!
//! The watcher callback only flips a flag. Every debounce interval the
//! debounce task checks the flag and, if set, rehashes each root; roots whose
//! hash really moved are copied into the mirror and a single `sync_push` is
//! enqueued. A separate timer enqueues `pull_apply` at a fixed interval.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::actions::{copy_into_mirror, SyncActions};
use super::backup::{backup_local_state, backup_timestamp, prune_backups};
use super::WatchedRoot;
use crate::config::AppConfig;
use crate::engine::{Task, TaskQueue, TaskRunner};
use crate::errors::{Result, SaveSyncError};
use crate::fs::FileSystem;
use crate::vcs::VersionControl;
use crate::watch::hash::{scan_root, HashCache};
use crate::watch::watcher::{ChangeCallback, ChangeSet, Watcher};

/// Upper bound on each join or queue drain during shutdown.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Hash every existing root once so the first debounce cycle has something to
/// compare against.
pub fn seed_hash_cache(fs: &dyn FileSystem, roots: &[WatchedRoot]) -> HashCache {
    let mut cache = HashCache::new();
    for root in roots {
        if !fs.exists(&root.root) {
            continue;
        }
        match scan_root(fs, &root.root, &root.filter) {
            Ok((files, hash)) => {
                debug!(game = %root.label(), files = files.len(), hash = %hash, "seeded content hash");
                cache.update(&root.root, hash);
            }
            Err(err) => warn!(game = %root.label(), error = %err, "initial hash failed"),
        }
    }
    cache
}

/// Rehash every root and copy the ones whose hash changed into the mirror.
///
/// Missing roots are skipped and keep their cached hash. Returns the roots
/// that really changed.
pub fn mirror_changed_roots(
    fs: &dyn FileSystem,
    roots: &[WatchedRoot],
    cache: &mut HashCache,
    mirror_dir: &Path,
) -> Vec<PathBuf> {
    let mut changed = Vec::new();

    for root in roots {
        if !fs.exists(&root.root) {
            continue;
        }
        let (files, hash) = match scan_root(fs, &root.root, &root.filter) {
            Ok(scan) => scan,
            Err(err) => {
                warn!(game = %root.label(), error = %err, "rescan failed; retrying on next change");
                continue;
            }
        };

        if cache.update(&root.root, hash) {
            let copied = copy_into_mirror(fs, root, &files, mirror_dir);
            info!(game = %root.label(), copied, "saves changed; copied to mirror");
            changed.push(root.root.clone());
        } else {
            debug!(game = %root.label(), "hash unchanged; ignoring watcher event");
        }
    }

    changed
}

/// Wait for `duration` or until stop is signalled. Returns true on stop.
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop_rx.borrow(),
        changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
    }
}

pub struct SyncOrchestrator {
    config: Arc<AppConfig>,
    fs: Arc<dyn FileSystem>,
    vcs: Arc<dyn VersionControl>,
    roots: Arc<Vec<WatchedRoot>>,
    pull_queue: TaskQueue,
    push_queue: TaskQueue,
    watcher: Watcher,
    changed: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    loops: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl SyncOrchestrator {
    /// Build an orchestrator whose queues run [`SyncActions`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Arc<AppConfig>,
        fs: Arc<dyn FileSystem>,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self> {
        let roots = Arc::new(WatchedRoot::from_games(fs.as_ref(), &config.games)?);
        let actions = SyncActions::new(
            Arc::clone(&fs),
            Arc::clone(&vcs),
            Arc::clone(&roots),
            config.git.repository_dir.clone(),
            config.general.effective_device_id(),
        );
        Self::build(config, fs, vcs, roots, Arc::new(actions))
    }

    /// Like [`SyncOrchestrator::new`] but with a custom task runner.
    pub fn with_runner(
        config: Arc<AppConfig>,
        fs: Arc<dyn FileSystem>,
        vcs: Arc<dyn VersionControl>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        let roots = Arc::new(WatchedRoot::from_games(fs.as_ref(), &config.games)?);
        Self::build(config, fs, vcs, roots, runner)
    }

    fn build(
        config: Arc<AppConfig>,
        fs: Arc<dyn FileSystem>,
        vcs: Arc<dyn VersionControl>,
        roots: Arc<Vec<WatchedRoot>>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| {
            SaveSyncError::Other(anyhow::anyhow!("orchestrator needs a tokio runtime: {err}"))
        })?;

        let changed = Arc::new(AtomicBool::new(false));
        let callback: ChangeCallback = {
            let changed = Arc::clone(&changed);
            Arc::new(move |change: &ChangeSet| {
                changed.store(true, Ordering::SeqCst);
                debug!(
                    root = ?change.root,
                    created = change.created.len(),
                    modified = change.modified.len(),
                    deleted = change.deleted.len(),
                    "watcher reported changes"
                );
                Ok(())
            })
        };
        let watcher = Watcher::new(
            Arc::clone(&fs),
            roots.iter().map(|r| r.root.clone()),
            config.sync.watch_interval(),
            callback,
        );

        let (stop_tx, _stop_rx) = watch::channel(false);

        Ok(Self {
            pull_queue: TaskQueue::new("pull", Arc::clone(&runner), handle.clone()),
            push_queue: TaskQueue::new("push", runner, handle),
            config,
            fs,
            vcs,
            roots,
            watcher,
            changed,
            stop_tx,
            loops: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn pull_queue(&self) -> &TaskQueue {
        &self.pull_queue
    }

    pub fn push_queue(&self) -> &TaskQueue {
        &self.push_queue
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    pub fn roots(&self) -> &[WatchedRoot] {
        &self.roots
    }

    /// Run the startup sequence and launch the timer, watcher and debounce
    /// loops. Only the first call does anything.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("orchestrator already started");
            return Ok(());
        }
        info!(roots = self.roots.len(), "orchestrator starting");

        let mirror_dir = self.config.git.repository_dir.clone();
        let backup_dir = self.config.backup.backup_dir.clone();
        self.fs.create_dir_all(&mirror_dir)?;
        self.fs.create_dir_all(&backup_dir)?;

        let vcs = Arc::clone(&self.vcs);
        let ready = match tokio::task::spawn_blocking(move || vcs.ensure_ready()).await {
            Ok(ready) => ready,
            Err(err) => {
                error!(error = %err, "mirror setup task failed");
                false
            }
        };
        if ready {
            info!(mirror = ?mirror_dir, "mirror ready");
        } else {
            warn!(mirror = ?mirror_dir, "mirror not ready; git steps will be retried by later tasks");
        }

        {
            let fs = Arc::clone(&self.fs);
            let games = self.config.games.clone();
            let backup_dir = backup_dir.clone();
            let ts = backup_timestamp(Local::now());
            tokio::task::spawn_blocking(move || {
                backup_local_state(fs.as_ref(), &games, &backup_dir, &ts)
            })
            .await
            .map_err(|err| SaveSyncError::Other(anyhow::anyhow!("backup task failed: {err}")))??;
        }

        self.pull_queue.enqueue(Task::pull_apply());
        self.push_queue.enqueue(Task::sync_push());

        {
            let fs = Arc::clone(&self.fs);
            let max_backups = self.config.backup.max_backups;
            let pruned = tokio::task::spawn_blocking(move || {
                prune_backups(fs.as_ref(), &backup_dir, max_backups)
            })
            .await;
            if let Err(err) = pruned {
                warn!(error = %err, "backup cleanup task failed");
            }
        }

        self.spawn_loop(
            "timer",
            timer_loop(
                self.pull_queue.clone(),
                self.config.sync.poll_interval(),
                self.stop_tx.subscribe(),
            ),
        );

        let cache = {
            let fs = Arc::clone(&self.fs);
            let roots = Arc::clone(&self.roots);
            match tokio::task::spawn_blocking(move || seed_hash_cache(fs.as_ref(), &roots)).await {
                Ok(cache) => cache,
                Err(err) => {
                    warn!(error = %err, "initial hashing failed; first change rehashes every root");
                    HashCache::new()
                }
            }
        };
        self.watcher.start().await?;
        self.spawn_loop(
            "debounce",
            debounce_loop(
                DebounceContext {
                    fs: Arc::clone(&self.fs),
                    roots: Arc::clone(&self.roots),
                    changed: Arc::clone(&self.changed),
                    push_queue: self.push_queue.clone(),
                    mirror_dir: self.config.git.repository_dir.clone(),
                    debounce: self.config.sync.debounce(),
                },
                cache,
                self.stop_tx.subscribe(),
            ),
        );

        info!("orchestrator started");
        Ok(())
    }

    fn spawn_loop<F>(&self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        self.loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name, handle));
    }

    /// Stop the timer and debounce loops and release the watcher.
    ///
    /// Joins are bounded by [`SHUTDOWN_JOIN_TIMEOUT`]; a timeout is logged and
    /// shutdown carries on. The queues get the same bound to drain; whatever
    /// is still running after that finishes on its own. Calling this twice is
    /// a no-op.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("orchestrator stopping");
        self.stop_tx.send_replace(true);

        let loops = std::mem::take(
            &mut *self
                .loops
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for (name, mut handle) in loops {
            match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "loop joined"),
                Ok(Err(err)) => error!(task = name, error = %err, "loop ended abnormally"),
                Err(_) => {
                    warn!(task = name, "loop did not stop in time; aborting it");
                    handle.abort();
                }
            }
        }

        self.watcher.release().await;

        for queue in [&self.pull_queue, &self.push_queue] {
            if !queue.wait_idle(SHUTDOWN_JOIN_TIMEOUT).await {
                warn!(queue = queue.name(), pending = queue.len(), "queue still busy at shutdown");
            }
        }
        info!("orchestrator stopped");
    }
}

async fn timer_loop(pull_queue: TaskQueue, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    info!(interval_secs = interval.as_secs(), "timer started");
    while !sleep_or_stop(&mut stop_rx, interval).await {
        pull_queue.enqueue(Task::pull_apply());
    }
    info!("timer stopped");
}

struct DebounceContext {
    fs: Arc<dyn FileSystem>,
    roots: Arc<Vec<WatchedRoot>>,
    changed: Arc<AtomicBool>,
    push_queue: TaskQueue,
    mirror_dir: PathBuf,
    debounce: Duration,
}

async fn debounce_loop(
    ctx: DebounceContext,
    mut cache: HashCache,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(debounce_ms = ctx.debounce.as_millis() as u64, "debounce loop started");

    while !sleep_or_stop(&mut stop_rx, ctx.debounce).await {
        if !ctx.changed.swap(false, Ordering::SeqCst) {
            continue;
        }

        let fs = Arc::clone(&ctx.fs);
        let roots = Arc::clone(&ctx.roots);
        let mirror_dir = ctx.mirror_dir.clone();
        let result = tokio::task::spawn_blocking(move || {
            let changed = mirror_changed_roots(fs.as_ref(), &roots, &mut cache, &mirror_dir);
            (cache, changed)
        })
        .await;

        let changed_roots = match result {
            Ok((returned, changed_roots)) => {
                cache = returned;
                changed_roots
            }
            Err(err) => {
                // The cache went down with the task; the next change
                // rehashes against an empty one.
                error!(error = %err, "debounce check failed");
                cache = HashCache::new();
                continue;
            }
        };

        if changed_roots.is_empty() {
            debug!("watcher fired but no content hash changed; not pushing");
        } else {
            info!(roots = changed_roots.len(), "real change detected; scheduling push");
            ctx.push_queue.enqueue(Task::sync_push());
        }
    }
    info!("debounce loop stopped");
}
