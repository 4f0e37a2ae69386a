mod support;

use std::sync::Arc;
use std::time::Duration;

use werewolf_server::error::EngineError;
use werewolf_server::models::action::{ActionKind, Submission};
use werewolf_server::models::mode::GameMode;
use werewolf_server::services::snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use werewolf_server::utils::clock::ManualClock;
use werewolf_server::utils::test_setup::setup_test_env;

use support::*;

async fn file_store(dir: &std::path::Path) -> Arc<FileSnapshotStore> {
    Arc::new(FileSnapshotStore::open(dir).await.unwrap())
}

#[tokio::test]
async fn test_concurrent_submissions_with_same_version_accept_exactly_one() {
    setup_test_env();
    let store = store_with(
        Arc::new(MemorySnapshotStore::new()),
        4,
        Arc::new(ManualClock::default()),
    );
    let id = store.create(classic9_roster()).await.unwrap();
    let session = step_until_pending(&store, &id).await;
    let version = session.state_version;

    let mut handles = Vec::new();
    for wolf in [1u8, 2, 3] {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let sub = Submission::new(wolf, ActionKind::Speak, version).content("me first");
            store.submit_action(&id, sub).await
        }));
    }

    let mut accepted = 0;
    let mut stale = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                accepted += 1;
                assert_eq!(receipt.state_version, version + 1);
            }
            Err(EngineError::StaleVersion { .. }) => stale += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((accepted, stale), (1, 2));
    assert_eq!(store.get(&id).await.unwrap().state_version, version + 1);
}

#[tokio::test]
async fn test_sessions_progress_in_parallel() {
    setup_test_env();
    let store = store_with(
        Arc::new(MemorySnapshotStore::new()),
        16,
        Arc::new(ManualClock::default()),
    );
    let mut ids = Vec::new();
    for seed in 0..8 {
        ids.push(store.create(dealt_roster(GameMode::Guard10, seed)).await.unwrap());
    }

    let mut handles = Vec::new();
    for id in ids.clone() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            step_until_pending(&store, &id).await;
            skip_all(&store, &id).await;
            store.get(&id).await.unwrap().state_version
        }));
    }
    for handle in handles {
        // one step into the guard phase plus the guard's skip
        assert_eq!(handle.await.unwrap(), 2);
    }
}

#[tokio::test]
async fn test_capacity_under_concurrent_creates() {
    setup_test_env();
    let store = store_with(
        Arc::new(MemorySnapshotStore::new()),
        4,
        Arc::new(ManualClock::default()),
    );
    let mut handles = Vec::new();
    for seed in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.create(dealt_roster(GameMode::Classic9, seed)).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(EngineError::CapacityExceeded { limit }) => assert_eq!(limit, 4),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 4);
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_swept_session_does_not_come_back_after_restart() {
    setup_test_env();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());

    let first = store_with(file_store(dir.path()).await, 4, clock.clone());
    let idle = first.create(classic9_roster()).await.unwrap();
    let active = first.create(classic9_roster()).await.unwrap();
    clock.advance(TTL / 2);
    first.step(&active).await.unwrap();
    clock.advance(TTL / 2 + Duration::from_secs(1));

    let report = first.sweep().await;
    assert_eq!(report.evicted, 1);
    assert!(!dir.path().join(format!("{idle}.json")).exists());

    // a fresh process over the same directory
    let second = store_with(file_store(dir.path()).await, 4, clock.clone());
    let restored = second.restore().await.unwrap();
    assert_eq!(restored.loaded, 1);
    assert!(matches!(
        second.get_view(&idle, 1).await,
        Err(EngineError::NotFound(_))
    ));
    let session = second.get(&active).await.unwrap();
    assert_eq!(session.state_version, 1);
}

#[tokio::test]
async fn test_restart_drops_sessions_that_expired_while_down() {
    setup_test_env();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());

    let first = store_with(file_store(dir.path()).await, 4, clock.clone());
    let id = first.create(classic9_roster()).await.unwrap();
    drop(first);

    // the server was down for longer than the TTL, so no sweep ran
    clock.advance(TTL + Duration::from_secs(1));
    let snapshots = file_store(dir.path()).await;
    let second = store_with(snapshots.clone(), 4, clock.clone());
    let report = second.restore().await.unwrap();

    assert_eq!((report.loaded, report.expired), (0, 1));
    assert!(!second.contains(&id).await);
    assert!(snapshots.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_snapshot_is_skipped_on_restore() {
    setup_test_env();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());

    let first = store_with(file_store(dir.path()).await, 4, clock.clone());
    let good = first.create(classic9_roster()).await.unwrap();
    tokio::fs::write(
        dir.path().join("0b7a7f3e-1111-4222-8333-944445555666.json"),
        b"{\"session\": {\"session_id\"",
    )
    .await
    .unwrap();

    let second = store_with(file_store(dir.path()).await, 4, clock);
    let report = second.restore().await.unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.corrupt, 1);
    assert!(second.contains(&good).await);
}

#[tokio::test]
async fn test_unreadable_snapshot_does_not_block_restore() {
    setup_test_env();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());

    let first = store_with(file_store(dir.path()).await, 4, clock.clone());
    let good = first.create(classic9_roster()).await.unwrap();
    // a directory where a record file should be cannot be read
    tokio::fs::create_dir(dir.path().join("0b7a7f3e-1111-4222-8333-944445555666.json"))
        .await
        .unwrap();

    let second = store_with(file_store(dir.path()).await, 4, clock);
    let report = second.restore().await.unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.corrupt, 1);
    assert!(second.contains(&good).await);
}

#[tokio::test]
async fn test_unreadable_memory_record_is_counted_as_corrupt() {
    setup_test_env();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let clock = Arc::new(ManualClock::default());

    let first = store_with(snapshots.clone(), 4, clock.clone());
    let kept = first.create(classic9_roster()).await.unwrap();
    let lost = first.create(classic9_roster()).await.unwrap();
    snapshots.make_unreadable(&lost);

    let second = store_with(snapshots, 4, clock);
    let report = second.restore().await.unwrap();
    assert_eq!((report.loaded, report.corrupt), (1, 1));
    assert!(second.contains(&kept).await);
    assert!(!second.contains(&lost).await);
}

#[tokio::test]
async fn test_failed_delete_is_reported_and_not_undone_by_restart() {
    setup_test_env();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let clock = Arc::new(ManualClock::default());

    let first = store_with(snapshots.clone(), 4, clock.clone());
    let id = first.create(classic9_roster()).await.unwrap();
    snapshots.fail_removes(true);
    let err = first.delete(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(first.contains(&id).await);

    // the caller retries once the store is back
    snapshots.fail_removes(false);
    first.delete(&id).await.unwrap();
    drop(first);

    let second = store_with(snapshots, 4, clock);
    let report = second.restore().await.unwrap();
    assert_eq!(report.loaded, 0);
    assert!(!second.contains(&id).await);
}

#[tokio::test]
async fn test_restore_keeps_most_recent_within_capacity() {
    setup_test_env();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let clock = Arc::new(ManualClock::default());

    let first = store_with(snapshots.clone(), 8, clock.clone());
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(first.create(classic9_roster()).await.unwrap());
        clock.advance(Duration::from_secs(10));
    }

    let second = store_with(snapshots, 2, clock);
    let report = second.restore().await.unwrap();
    assert_eq!((report.loaded, report.over_capacity), (2, 1));
    assert!(!second.contains(&ids[0]).await);
    assert!(second.contains(&ids[1]).await);
    assert!(second.contains(&ids[2]).await);
}

#[tokio::test]
async fn test_mutation_survives_failed_snapshot_write() {
    setup_test_env();
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let store = store_with(snapshots.clone(), 4, Arc::new(ManualClock::default()));
    let id = store.create(classic9_roster()).await.unwrap();

    snapshots.fail_writes(true);
    let report = store.step(&id).await.unwrap();
    assert!(report.outcome.advanced());
    assert_eq!(store.get(&id).await.unwrap().state_version, 1);

    // the next accepted mutation carries the retry
    snapshots.fail_writes(false);
    skip_all(&store, &id).await;
    let bytes = snapshots.get(&id).unwrap();
    let snapshot = werewolf_server::services::snapshot::Snapshot::decode(&bytes).unwrap();
    assert_eq!(snapshot.session.state_version, 4);
}
