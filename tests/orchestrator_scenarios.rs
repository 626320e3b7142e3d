use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filetime::FileTime;
use savesync::engine::TaskKind;
use savesync::errors::SaveSyncError;
use savesync::fs::mock::MockFileSystem;
use savesync::fs::{FileSystem, RealFileSystem};
use savesync::sync::{mirror_changed_roots, seed_hash_cache, SyncOrchestrator, WatchedRoot};
use savesync::types::WatcherState;
use savesync::vcs::VersionControl;
use savesync_test_utils::builders::{AppConfigBuilder, GameEntryBuilder};
use savesync_test_utils::fakes::{FakeVcs, RecordingRunner};
use savesync_test_utils::{init_tracing, wait_until, with_timeout};

const SETTLE: Duration = Duration::from_secs(5);

struct Harness {
    _dir: tempfile::TempDir,
    base: PathBuf,
    saves: PathBuf,
    runner: RecordingRunner,
    vcs: Arc<FakeVcs>,
    orchestrator: SyncOrchestrator,
}

fn harness_with(saves_exist: bool) -> Harness {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let saves = base.join("saves");
    if saves_exist {
        fs::create_dir_all(&saves).unwrap();
        fs::write(saves.join("a.txt"), vec![b'a'; 100]).unwrap();
    }

    let config = AppConfigBuilder::new(&base)
        .with_game(GameEntryBuilder::new("celeste", &saves).build())
        .with_debounce_ms(150)
        .with_watch_interval_ms(100)
        .with_max_backups(2)
        .with_poll_interval_minutes(1)
        .build();
    let runner = RecordingRunner::new();
    let vcs = Arc::new(FakeVcs::new());
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let vcs_dyn: Arc<dyn VersionControl> = vcs.clone();
    let orchestrator =
        SyncOrchestrator::with_runner(Arc::new(config), fs, vcs_dyn, Arc::new(runner.clone()))
            .unwrap();

    Harness {
        _dir: dir,
        base,
        saves,
        runner,
        vcs,
        orchestrator,
    }
}

async fn start_and_settle(h: &Harness) {
    with_timeout(h.orchestrator.start()).await.unwrap();
    assert!(h.orchestrator.pull_queue().wait_idle(SETTLE).await);
    assert!(h.orchestrator.push_queue().wait_idle(SETTLE).await);
}

#[tokio::test]
async fn startup_backs_up_and_schedules_one_pull_and_one_push() {
    let h = harness_with(true);
    start_and_settle(&h).await;

    assert_eq!(h.vcs.calls().first().map(String::as_str), Some("ensure_ready"));
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 1);
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 1);
    assert_eq!(h.orchestrator.watcher().state(), WatcherState::Running);

    let backups: Vec<PathBuf> = fs::read_dir(h.base.join("backup"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 1);
    let copied = backups[0].join("celeste").join("a.txt");
    assert_eq!(fs::read(copied).unwrap().len(), 100);
    assert!(h.base.join("repository").is_dir());

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn startup_prunes_old_backups() {
    let h = harness_with(true);
    for (name, secs) in [("20200101_000000", 100), ("20200102_000000", 200), ("20200103_000000", 300)] {
        let dir = h.base.join("backup").join(name);
        fs::create_dir_all(&dir).unwrap();
        filetime::set_file_mtime(&dir, FileTime::from_unix_time(1_600_000_000 + secs, 0)).unwrap();
    }
    start_and_settle(&h).await;

    let mut left: Vec<String> = fs::read_dir(h.base.join("backup"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left.len(), 2);
    assert_eq!(left[0], "20200103_000000");
    assert!(left[1].as_str() > "2020");

    h.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn timer_enqueues_a_pull_every_interval_until_shutdown() {
    let h = harness_with(true);
    start_and_settle(&h).await;
    let interval = Duration::from_secs(60);
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 1);

    // Nothing before one full interval has passed.
    tokio::time::sleep(interval - Duration::from_secs(5)).await;
    assert!(h.orchestrator.pull_queue().wait_idle(SETTLE).await);
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.orchestrator.pull_queue().wait_idle(SETTLE).await);
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 2);

    tokio::time::sleep(interval).await;
    assert!(h.orchestrator.pull_queue().wait_idle(SETTLE).await);
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 3);

    h.orchestrator.shutdown().await;
    tokio::time::sleep(interval * 3).await;
    assert_eq!(h.runner.count_started(TaskKind::PullApply), 3);
}

#[derive(Debug)]
struct PanickingBackupListing {
    backup_dir: PathBuf,
}

impl FileSystem for PanickingBackupListing {
    fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }
    fn is_file(&self, path: &Path) -> bool {
        RealFileSystem.is_file(path)
    }
    fn is_dir(&self, path: &Path) -> bool {
        RealFileSystem.is_dir(path)
    }
    fn metadata(&self, path: &Path) -> anyhow::Result<savesync::fs::FileStat> {
        RealFileSystem.metadata(path)
    }
    fn canonicalize(&self, path: &Path) -> anyhow::Result<PathBuf> {
        RealFileSystem.canonicalize(path)
    }
    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        if path == self.backup_dir {
            panic!("listing backups blew up");
        }
        RealFileSystem.read_dir(path)
    }
    fn copy_file(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        RealFileSystem.copy_file(from, to)
    }
    fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        RealFileSystem.create_dir_all(path)
    }
    fn remove_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        RealFileSystem.remove_dir_all(path)
    }
}

#[tokio::test]
async fn startup_survives_a_panicking_backup_cleanup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let saves = base.join("saves");
    fs::create_dir_all(&saves).unwrap();
    fs::write(saves.join("a.txt"), b"data").unwrap();

    let config = AppConfigBuilder::new(&base)
        .with_game(GameEntryBuilder::new("celeste", &saves).build())
        .build();
    let fs: Arc<dyn FileSystem> = Arc::new(PanickingBackupListing {
        backup_dir: base.join("backup"),
    });
    let runner = RecordingRunner::new();
    let orchestrator = SyncOrchestrator::with_runner(
        Arc::new(config),
        fs,
        Arc::new(FakeVcs::new()),
        Arc::new(runner.clone()),
    )
    .unwrap();

    with_timeout(orchestrator.start()).await.unwrap();
    assert_eq!(orchestrator.watcher().state(), WatcherState::Running);
    assert!(orchestrator.push_queue().wait_idle(SETTLE).await);
    assert_eq!(runner.count_started(TaskKind::SyncPush), 1);

    fs::write(saves.join("a.txt"), b"more data").unwrap();
    assert!(wait_until(SETTLE, || runner.count_started(TaskKind::SyncPush) == 2).await);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn content_change_triggers_exactly_one_extra_push() {
    let h = harness_with(true);
    start_and_settle(&h).await;
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 1);

    let mut content = fs::read(h.saves.join("a.txt")).unwrap();
    content.push(b'!');
    fs::write(h.saves.join("a.txt"), &content).unwrap();

    assert!(wait_until(SETTLE, || h.runner.count_started(TaskKind::SyncPush) == 2).await);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 2);

    let mirrored = h.base.join("repository").join("celeste").join("a.txt");
    assert_eq!(fs::read(mirrored).unwrap().len(), 101);

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn rewrite_with_same_size_and_mtime_does_not_push() {
    let h = harness_with(true);
    start_and_settle(&h).await;

    let path = h.saves.join("a.txt");
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
    fs::write(&path, vec![b'b'; 100]).unwrap();
    filetime::set_file_mtime(&path, mtime).unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 1);

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn save_directory_created_after_startup_is_picked_up() {
    let h = harness_with(false);
    start_and_settle(&h).await;
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 1);

    fs::create_dir_all(&h.saves).unwrap();
    fs::write(h.saves.join("slot1.sav"), b"progress").unwrap();

    assert!(wait_until(SETTLE, || h.runner.count_started(TaskKind::SyncPush) == 2).await);
    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_silences_the_watcher() {
    let h = harness_with(true);
    start_and_settle(&h).await;

    h.orchestrator.shutdown().await;
    h.orchestrator.shutdown().await;
    assert_eq!(h.orchestrator.watcher().state(), WatcherState::Released);

    fs::write(h.saves.join("late.sav"), b"after shutdown").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.runner.count_started(TaskKind::SyncPush), 1);
}

#[tokio::test]
async fn second_start_does_not_repeat_startup() {
    let h = harness_with(true);
    start_and_settle(&h).await;
    h.orchestrator.start().await.unwrap();
    assert!(h.orchestrator.pull_queue().wait_idle(SETTLE).await);

    assert_eq!(h.runner.count_started(TaskKind::PullApply), 1);
    let ready_calls = h.vcs.calls().iter().filter(|c| *c == "ensure_ready").count();
    assert_eq!(ready_calls, 1);
    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn default_runner_commits_and_pushes_on_startup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let saves = base.join("saves");
    fs::create_dir_all(&saves).unwrap();
    fs::write(saves.join("a.txt"), b"hello").unwrap();

    let config = AppConfigBuilder::new(&base)
        .with_game(GameEntryBuilder::new("celeste", &saves).index("index0").build())
        .build();
    let vcs = Arc::new(FakeVcs::new());
    let vcs_dyn: Arc<dyn VersionControl> = vcs.clone();
    let orchestrator =
        SyncOrchestrator::new(Arc::new(config), Arc::new(RealFileSystem), vcs_dyn).unwrap();

    orchestrator.start().await.unwrap();
    assert!(orchestrator.pull_queue().wait_idle(SETTLE).await);
    assert!(orchestrator.push_queue().wait_idle(SETTLE).await);

    let calls = vcs.calls();
    assert!(calls.contains(&"pull_latest".to_string()));
    assert!(calls.iter().any(|c| c.starts_with("commit:sync by test-device at ")));
    assert!(calls.contains(&"push".to_string()));
    let mirrored = base.join("repository").join("celeste").join("index0").join("a.txt");
    assert_eq!(fs::read(mirrored).unwrap(), b"hello");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn invalid_glob_fails_construction() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfigBuilder::new(dir.path())
        .with_game(GameEntryBuilder::new("celeste", dir.path()).build())
        .build();
    config.games[0].allow.push("[".to_string());

    let result = SyncOrchestrator::with_runner(
        Arc::new(config),
        Arc::new(RealFileSystem),
        Arc::new(FakeVcs::new()),
        Arc::new(RecordingRunner::new()),
    );
    assert!(matches!(result, Err(SaveSyncError::PatternError(_))));
}

fn mock_roots(fs: &MockFileSystem) -> Vec<WatchedRoot> {
    let games = vec![
        GameEntryBuilder::new("celeste", "/saves/celeste").index("index0").build(),
        GameEntryBuilder::new("hollow", "/saves/hollow").deny("*.bak").build(),
        GameEntryBuilder::new("missing", "/saves/missing").build(),
    ];
    WatchedRoot::from_games(fs, &games).unwrap()
}

#[test]
fn mirror_changed_roots_copies_only_what_moved() {
    let fs = MockFileSystem::new();
    fs.add_file("/saves/celeste/slot.sav", "v1");
    fs.add_file("/saves/hollow/user1.dat", "v1");
    fs.add_file("/saves/hollow/user1.bak", "old");
    let roots = mock_roots(&fs);
    let mirror = Path::new("/mirror");

    let mut cache = seed_hash_cache(&fs, &roots);
    assert_eq!(cache.len(), 2);
    assert!(mirror_changed_roots(&fs, &roots, &mut cache, mirror).is_empty());
    assert!(!fs.exists(mirror));

    fs.add_file("/saves/celeste/slot.sav", "v2");
    fs.add_file("/saves/hollow/user1.bak", "ignored");
    let changed = mirror_changed_roots(&fs, &roots, &mut cache, mirror);
    assert_eq!(changed, vec![PathBuf::from("/saves/celeste")]);
    assert_eq!(
        fs.content("/mirror/celeste/index0/slot.sav"),
        Some(b"v2".to_vec())
    );
    assert!(!fs.exists(Path::new("/mirror/hollow")));

    fs.add_file("/saves/hollow/user2.dat", "new");
    let changed = mirror_changed_roots(&fs, &roots, &mut cache, mirror);
    assert_eq!(changed, vec![PathBuf::from("/saves/hollow")]);
    assert!(fs.exists(Path::new("/mirror/hollow/user2.dat")));
    assert!(!fs.exists(Path::new("/mirror/hollow/user1.bak")));
}

#[test]
fn root_appearing_later_counts_as_changed() {
    let fs = MockFileSystem::new();
    fs.add_file("/saves/celeste/slot.sav", "v1");
    let roots = mock_roots(&fs);
    let mut cache = seed_hash_cache(&fs, &roots);

    fs.add_file("/saves/missing/first.sav", "hello");
    let changed = mirror_changed_roots(&fs, &roots, &mut cache, Path::new("/mirror"));
    assert_eq!(changed, vec![PathBuf::from("/saves/missing")]);
    assert_eq!(fs.content("/mirror/missing/first.sav"), Some(b"hello".to_vec()));
}
