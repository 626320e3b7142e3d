use proptest::prelude::*;
use savesync::engine::{EnqueueOutcome, InsertMode, PendingTasks, Task, TaskKind};

fn task(key: &str, unique: bool, mode: InsertMode) -> Task {
    Task::new(TaskKind::SyncPush, key, unique, mode)
}

fn op_strategy() -> impl Strategy<Value = (usize, bool, bool, bool)> {
    // (key index, unique, tail mode, pop instead of push)
    (0..4usize, any::<bool>(), any::<bool>(), prop::bool::weighted(0.2))
}

proptest! {
    #[test]
    fn unique_keys_never_pending_twice(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut pending = PendingTasks::new();

        for (key_idx, unique, tail, pop) in ops {
            if pop {
                pending.pop_front();
            } else {
                let key = format!("k{key_idx}");
                let mode = if tail { InsertMode::Tail } else { InsertMode::Fixed };
                pending.push(task(&key, unique, mode));
            }

            for k in 0..4 {
                let key = format!("k{k}");
                let unique_copies = pending
                    .iter()
                    .filter(|t| t.unique && t.key == key)
                    .count();
                prop_assert!(unique_copies <= 1, "key {} pending {} times", key, unique_copies);
            }
        }
    }

    #[test]
    fn repeated_unique_pushes_keep_a_single_entry(
        modes in proptest::collection::vec(any::<bool>(), 1..30)
    ) {
        let mut pending = PendingTasks::new();
        for tail in modes {
            let mode = if tail { InsertMode::Tail } else { InsertMode::Fixed };
            pending.push(task("sync_push", true, mode));
            prop_assert_eq!(pending.len(), 1);
        }
    }

    #[test]
    fn tail_moves_the_pending_task_behind_every_other_key(
        others in proptest::collection::vec(1..6usize, 1..8),
        dup_at in 0..8usize,
    ) {
        let mut pending = PendingTasks::new();
        let dup_at = dup_at % (others.len() + 1);
        for (i, other) in others.iter().enumerate() {
            if i == dup_at {
                pending.push(task("dup", true, InsertMode::Tail));
            }
            pending.push(task(&format!("other{other}"), false, InsertMode::Tail));
        }
        if dup_at == others.len() {
            pending.push(task("dup", true, InsertMode::Tail));
        }
        let len_before = pending.len();

        let outcome = pending.push(task("dup", true, InsertMode::Tail));
        let is_tail = outcome == EnqueueOutcome::MovedToTail;
        prop_assert!(is_tail);

        let keys = pending.keys();
        prop_assert_eq!(keys.len(), len_before);
        prop_assert_eq!(keys.last().map(String::as_str), Some("dup"));
        prop_assert_eq!(keys.iter().filter(|k| k.as_str() == "dup").count(), 1);
    }

    #[test]
    fn fixed_never_moves_the_pending_task(
        others in proptest::collection::vec(1..6usize, 1..8),
        dup_at in 0..8usize,
    ) {
        let mut pending = PendingTasks::new();
        let dup_at = dup_at % (others.len() + 1);
        for (i, other) in others.iter().enumerate() {
            if i == dup_at {
                pending.push(task("dup", true, InsertMode::Fixed));
            }
            pending.push(task(&format!("other{other}"), false, InsertMode::Fixed));
        }
        if dup_at == others.len() {
            pending.push(task("dup", true, InsertMode::Fixed));
        }
        let before = pending.keys();

        let outcome = pending.push(task("dup", true, InsertMode::Fixed));
        let kept = outcome == EnqueueOutcome::KeptInPlace;
        prop_assert!(kept);
        prop_assert_eq!(pending.keys(), before);
    }
}

#[test]
fn non_unique_tasks_are_always_appended() {
    let mut pending = PendingTasks::new();
    assert_eq!(
        pending.push(task("a", false, InsertMode::Tail)),
        EnqueueOutcome::Appended
    );
    assert_eq!(
        pending.push(task("a", false, InsertMode::Fixed)),
        EnqueueOutcome::Appended
    );
    assert_eq!(pending.keys(), vec!["a", "a"]);
}

#[test]
fn popping_a_unique_task_frees_its_key() {
    let mut pending = PendingTasks::new();
    pending.push(Task::pull_apply());
    let popped = pending.pop_front().unwrap();
    assert_eq!(popped.kind, TaskKind::PullApply);

    assert_eq!(pending.push(Task::pull_apply()), EnqueueOutcome::Appended);
    assert_eq!(pending.len(), 1);
}

#[test]
fn unique_task_is_not_confused_with_a_non_unique_one_sharing_its_key() {
    let mut pending = PendingTasks::new();
    pending.push(task("x", false, InsertMode::Tail));
    pending.push(task("x", true, InsertMode::Tail));
    pending.push(task("y", false, InsertMode::Tail));

    assert_eq!(
        pending.push(task("x", true, InsertMode::Tail)),
        EnqueueOutcome::MovedToTail
    );
    assert_eq!(pending.keys(), vec!["x", "y", "x"]);

    // Draining the non-unique copy keeps the unique one indexed.
    pending.pop_front();
    assert_eq!(
        pending.push(task("x", true, InsertMode::Fixed)),
        EnqueueOutcome::KeptInPlace
    );
    assert_eq!(pending.len(), 2);
}
