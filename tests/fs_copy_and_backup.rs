use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use filetime::FileTime;
use savesync::fs::mock::MockFileSystem;
use savesync::fs::{copy_tree, walk_files, FileSystem, RealFileSystem};
use savesync::sync::{backup_local_state, backup_timestamp, prune_backups};
use savesync::watch::path_utils::relative_str;
use savesync::watch::{collect_filtered_files, RootFilter};
use savesync_test_utils::builders::GameEntryBuilder;

fn filter(allow: &[&str], deny: &[&str]) -> RootFilter {
    let allow: Vec<String> = allow.iter().map(|s| s.to_string()).collect();
    let deny: Vec<String> = deny.iter().map(|s| s.to_string()).collect();
    RootFilter::new(&allow, &deny).unwrap()
}

#[test]
fn root_filter_allow_and_deny() {
    let all = RootFilter::allow_all();
    assert!(all.matches("anything/at/all.bin"));

    let saves = filter(&["*.sav"], &[]);
    assert!(saves.matches("slot1.sav"));
    assert!(saves.matches("profiles/slot2.sav"));
    assert!(!saves.matches("settings.ini"));

    let deny_wins = filter(&["*.sav"], &["backup/*"]);
    assert!(deny_wins.matches("slot1.sav"));
    assert!(!deny_wins.matches("backup/slot1.sav"));

    let only_deny = filter(&[], &["*.tmp", "cache/**"]);
    assert!(only_deny.matches("slot1.sav"));
    assert!(!only_deny.matches("x.tmp"));
    assert!(!only_deny.matches("cache/shader.bin"));
}

#[test]
fn invalid_glob_is_rejected() {
    assert!(RootFilter::new(&["[".to_string()], &[]).is_err());
}

#[test]
fn relative_paths_use_forward_slashes() {
    assert_eq!(
        relative_str(Path::new("/root"), Path::new("/root/a/b.sav")),
        Some("a/b.sav".to_string())
    );
    assert_eq!(relative_str(Path::new("/root"), Path::new("/other/b.sav")), None);
}

#[test]
fn walk_and_filter_on_mock() {
    let fs = MockFileSystem::new();
    fs.add_file("/g/b.sav", "b");
    fs.add_file("/g/nested/a.sav", "a");
    fs.add_file("/g/nested/notes.txt", "n");

    assert_eq!(
        walk_files(&fs, Path::new("/g")).unwrap(),
        vec![
            PathBuf::from("/g/b.sav"),
            PathBuf::from("/g/nested/a.sav"),
            PathBuf::from("/g/nested/notes.txt"),
        ]
    );
    assert!(walk_files(&fs, Path::new("/missing")).unwrap().is_empty());

    let files = collect_filtered_files(&fs, Path::new("/g"), &filter(&["*.sav"], &[])).unwrap();
    assert_eq!(
        files,
        vec![PathBuf::from("/g/b.sav"), PathBuf::from("/g/nested/a.sav")]
    );
}

#[test]
fn copy_tree_keeps_layout_and_skips_foreign_files() {
    let fs = MockFileSystem::new();
    fs.add_file("/src/top.sav", "top");
    fs.add_file("/src/deep/er/inner.sav", "inner");
    fs.add_file("/elsewhere/stray.sav", "stray");
    fs.add_file("/dst/top.sav", "stale");

    let files = vec![
        PathBuf::from("/src/top.sav"),
        PathBuf::from("/src/deep/er/inner.sav"),
        PathBuf::from("/elsewhere/stray.sav"),
    ];
    let copied = copy_tree(&fs, &files, Path::new("/src"), Path::new("/dst"));

    assert_eq!(copied, 2);
    assert_eq!(fs.content("/dst/top.sav"), Some(b"top".to_vec()));
    assert_eq!(fs.content("/dst/deep/er/inner.sav"), Some(b"inner".to_vec()));
    assert!(!fs.exists(Path::new("/dst/stray.sav")));
}

#[test]
fn copy_tree_on_disk_preserves_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    fs::create_dir_all(src.join("slot")).unwrap();
    let file = src.join("slot").join("save.dat");
    fs::write(&file, b"payload").unwrap();
    let old = FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&file, old).unwrap();

    let real = RealFileSystem;
    let copied = copy_tree(&real, &[file.clone()], &src, &dst);
    assert_eq!(copied, 1);

    let target = dst.join("slot").join("save.dat");
    assert_eq!(fs::read(&target).unwrap(), b"payload");
    assert_eq!(
        real.metadata(&target).unwrap(),
        real.metadata(&file).unwrap()
    );
}

#[test]
fn backup_timestamp_is_sortable() {
    let t = Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
    assert_eq!(backup_timestamp(t), "20240131_235958");
}

#[test]
fn backup_copies_filtered_files_per_game() {
    let fs = MockFileSystem::new();
    fs.add_file("/saves/celeste/0.celeste", "slot0");
    fs.add_file("/saves/celeste/debug.log", "noise");
    fs.add_file("/saves/hollow/user1.dat", "hk");

    let games = vec![
        GameEntryBuilder::new("celeste", "/saves/celeste")
            .allow("*.celeste")
            .build(),
        GameEntryBuilder::new("hollow", "/saves/hollow").index("index1").build(),
        GameEntryBuilder::new("absent", "/saves/absent").build(),
    ];

    let ts_dir =
        backup_local_state(&fs, &games, Path::new("/backup"), "20240101_000000").unwrap();
    assert_eq!(ts_dir, PathBuf::from("/backup/20240101_000000"));

    assert_eq!(
        fs.content("/backup/20240101_000000/celeste/0.celeste"),
        Some(b"slot0".to_vec())
    );
    assert!(!fs.exists(Path::new("/backup/20240101_000000/celeste/debug.log")));
    assert_eq!(
        fs.content("/backup/20240101_000000/hollow/index1/user1.dat"),
        Some(b"hk".to_vec())
    );
    assert!(!fs.exists(Path::new("/backup/20240101_000000/absent")));
}

#[test]
fn backup_fails_when_its_directory_cannot_be_created() {
    let fs = MockFileSystem::new();
    fs.add_file("/backup/ts", "a file, not a directory");
    let games = vec![GameEntryBuilder::new("g", "/saves/g").build()];
    assert!(backup_local_state(&fs, &games, Path::new("/backup"), "ts").is_err());
}

#[test]
fn prune_keeps_newest_names_when_mtimes_tie() {
    let fs = MockFileSystem::new();
    for name in ["20240101_000000", "20240102_000000", "20240103_000000"] {
        fs.create_dir_all(&Path::new("/backup").join(name)).unwrap();
    }
    fs.add_file("/backup/stray.txt", "not a backup");

    let removed = prune_backups(&fs, Path::new("/backup"), 2);
    assert_eq!(removed, vec![PathBuf::from("/backup/20240101_000000")]);
    assert!(fs.exists(Path::new("/backup/20240102_000000")));
    assert!(fs.exists(Path::new("/backup/20240103_000000")));
    assert!(fs.exists(Path::new("/backup/stray.txt")));

    assert!(prune_backups(&fs, Path::new("/backup"), 5).is_empty());
    assert!(prune_backups(&fs, Path::new("/nowhere"), 0).is_empty());
}

#[test]
fn prune_orders_by_modification_time_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path();
    let stamps = [("a", 300), ("b", 100), ("c", 200)];
    for (name, secs) in stamps {
        let path = backup.join(name);
        fs::create_dir(&path).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 + secs, 0)).unwrap();
    }

    let mut removed = prune_backups(&RealFileSystem, backup, 1);
    removed.sort();
    assert_eq!(removed, vec![backup.join("b"), backup.join("c")]);
    assert!(backup.join("a").is_dir());

    let removed = prune_backups(&RealFileSystem, backup, 0);
    assert_eq!(removed, vec![backup.join("a")]);
}
