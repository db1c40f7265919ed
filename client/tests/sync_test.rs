//! Integration tests for the sync engine.
//!
//! The engine runs against an in-memory local store and a `MemoryRemote`, so
//! every remote call can be counted and every failure injected.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stride_client::remote::{Failure, RemoteMethod};
use stride_client::{
    ConnectionState, ConnectivityMonitor, LocalStore, MemoryRemote, PendingQueue, RemoteAdapter,
    SyncEngine, SyncError,
};
use stride_engine::{OperationKind, Record, Schema, StoreId, SyncOptions};

const USER: &str = "user-1";

struct Harness {
    engine: Arc<SyncEngine>,
    remote: Arc<MemoryRemote>,
    monitor: Arc<ConnectivityMonitor>,
    store: Arc<LocalStore>,
}

async fn harness() -> Harness {
    let store = Arc::new(LocalStore::in_memory(Schema::standard().unwrap()));
    store.init().await.unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let monitor = Arc::new(ConnectivityMonitor::from_signal(true));
    let engine = Arc::new(SyncEngine::new(
        Arc::new(PendingQueue::new(Arc::clone(&store))),
        RemoteAdapter::new(remote.clone()),
        Arc::clone(&monitor),
    ));
    engine.set_principal(USER);

    Harness {
        engine,
        remote,
        monitor,
        store,
    }
}

impl Harness {
    async fn pending(&self) -> u64 {
        self.engine.queue().len(USER).await.unwrap()
    }

    async fn enqueue_deletes(&self, count: usize) {
        for i in 0..count {
            self.engine
                .queue()
                .enqueue_at(
                    USER,
                    StoreId::Goals,
                    OperationKind::Delete,
                    format!("g-{i:03}"),
                    None,
                    1_000 + i as u64,
                )
                .await
                .unwrap();
        }
    }

    fn record_progress(&self) -> Arc<Mutex<Vec<usize>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        self.engine
            .add_sync_listener(move |progress| sink.lock().unwrap().push(progress.processed));
        seen
    }
}

fn profile(id: &str, name: &str, last_updated: serde_json::Value) -> Record {
    Record::new()
        .with("id", json!(id))
        .with("userId", json!(USER))
        .with("displayName", json!(name))
        .with("lastUpdated", last_updated)
}

async fn wait_until_drained(engine: &SyncEngine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !engine.queue().is_empty(USER).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained in time");
}

// ============================================================================
// Guards
// ============================================================================

#[tokio::test]
async fn empty_queue_sync_is_a_successful_noop() {
    let h = harness().await;

    assert!(h.engine.trigger_sync().await);
    assert_eq!(h.remote.call_count(), 0);
    assert!(h.engine.get_last_sync_time().is_some());
}

#[tokio::test]
async fn refuses_without_principal() {
    let h = harness().await;
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();
    h.engine.clear_principal();

    assert!(!h.engine.trigger_sync().await);
    assert!(matches!(h.engine.sync_now().await, Err(SyncError::NoPrincipal)));
    assert_eq!(h.remote.call_count(), 0);
    assert!(h.engine.get_last_sync_time().is_none());
}

#[tokio::test]
async fn refuses_while_offline_or_reconnecting() {
    let h = harness().await;
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    h.monitor.report_signal(false);
    assert!(!h.engine.trigger_sync().await);

    h.monitor.set_state(ConnectionState::Reconnecting);
    assert!(matches!(h.engine.sync_now().await, Err(SyncError::Offline)));

    assert_eq!(h.remote.call_count(), 0);
    assert_eq!(h.pending().await, 1);
}

#[tokio::test]
async fn concurrent_triggers_are_single_flight() {
    let h = harness().await;
    h.remote.set_latency(Some(Duration::from_millis(50)));
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    let (first, second) = tokio::join!(h.engine.trigger_sync(), h.engine.trigger_sync());

    assert!(first);
    assert!(!second);
    assert_eq!(h.remote.call_count(), 1);
    assert!(!h.engine.is_syncing());
}

#[tokio::test]
async fn configure_rejects_invalid_options() {
    let h = harness().await;
    assert!(h
        .engine
        .configure(SyncOptions::default().with_batch_size(0))
        .is_err());
    assert_eq!(h.engine.options().batch_size, 50);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn drains_by_store_priority() {
    let h = harness().await;
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();
    h.engine.create_local(StoreId::Profiles, Record::new()).await.unwrap();
    h.engine.create_local(StoreId::Workouts, Record::new()).await.unwrap();

    assert!(h.engine.trigger_sync().await);

    let collections: Vec<_> = h.remote.calls().into_iter().map(|c| c.collection).collect();
    assert_eq!(
        collections,
        vec!["user_profiles", "workout_sessions", "fitness_goals"]
    );
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn created_records_reach_remote_in_remote_naming() {
    let h = harness().await;
    let id = h
        .engine
        .create_local(
            StoreId::Workouts,
            Record::new().with("workoutName", json!("Push day")),
        )
        .await
        .unwrap();

    // The principal field is filled in locally
    let local = h.store.get(StoreId::Workouts, &id).await.unwrap().unwrap();
    assert_eq!(local.get("userId"), Some(&json!(USER)));

    assert!(h.engine.trigger_sync().await);
    let row = h.remote.row("workout_sessions", &id).unwrap();
    assert_eq!(row["workout_name"], "Push day");
    assert_eq!(row["user_id"], USER);
}

#[tokio::test]
async fn deletes_reach_remote() {
    let h = harness().await;
    h.remote
        .seed("body_metrics", json!({"id": "m-1", "user_id": USER, "weight_kg": 72.0}));

    h.engine.delete_local(StoreId::BodyMetrics, "m-1").await.unwrap();
    assert!(h.engine.trigger_sync().await);

    assert!(h.remote.row("body_metrics", "m-1").is_none());
}

#[tokio::test]
async fn server_wins_keeps_newer_remote_record() {
    let h = harness().await;
    let remote_row = json!({
        "id": "p-1",
        "user_id": USER,
        "display_name": "Edited by admin",
        "last_updated": "2024-03-02T10:00:00Z",
    });
    h.remote.seed("user_profiles", remote_row.clone());

    // 2024-03-01T10:00:00Z
    let local = profile("p-1", "Edited offline", json!(1_709_287_200_000u64));
    h.engine.update_local(StoreId::Profiles, local).await.unwrap();

    assert!(h.engine.trigger_sync().await);
    assert_eq!(h.remote.row("user_profiles", "p-1"), Some(remote_row));
    assert_eq!(h.pending().await, 0);

    let methods: Vec<_> = h.remote.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![RemoteMethod::FetchOne]);
}

#[tokio::test]
async fn server_wins_writes_newer_local_record() {
    let h = harness().await;
    h.remote.seed(
        "user_profiles",
        json!({"id": "p-1", "display_name": "Old", "last_updated": "2024-03-01T10:00:00Z"}),
    );

    let local = profile("p-1", "New", json!("2024-03-05T08:00:00Z"));
    h.engine.update_local(StoreId::Profiles, local).await.unwrap();

    assert!(h.engine.trigger_sync().await);
    assert_eq!(h.remote.row("user_profiles", "p-1").unwrap()["display_name"], "New");

    let methods: Vec<_> = h.remote.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![RemoteMethod::FetchOne, RemoteMethod::Update]);
}

#[tokio::test]
async fn client_wins_overwrites_regardless_of_timestamps() {
    let h = harness().await;
    h.remote.seed(
        "workout_sessions",
        json!({"id": "w-1", "status": "planned", "last_updated": "2030-01-01T00:00:00Z"}),
    );

    let local = Record::new()
        .with("id", json!("w-1"))
        .with("status", json!("completed"))
        .with("lastUpdated", json!(0));
    h.engine.update_local(StoreId::Workouts, local).await.unwrap();

    assert!(h.engine.trigger_sync().await);
    assert_eq!(h.remote.row("workout_sessions", "w-1").unwrap()["status"], "completed");

    let methods: Vec<_> = h.remote.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![RemoteMethod::Update]);
}

#[tokio::test]
async fn server_wins_update_of_unknown_remote_row_inserts_it() {
    let h = harness().await;
    let local = profile("p-9", "Created offline", json!("2024-03-05T08:00:00Z"));
    h.engine.update_local(StoreId::Profiles, local).await.unwrap();

    assert!(h.engine.trigger_sync().await);

    let row = h.remote.row("user_profiles", "p-9").unwrap();
    assert_eq!(row["display_name"], "Created offline");
    assert_eq!(row["user_id"], USER);
    let methods: Vec<_> = h.remote.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![RemoteMethod::FetchOne, RemoteMethod::Insert]);
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn client_wins_update_of_unknown_remote_row_creates_it() {
    let h = harness().await;
    let local = Record::new()
        .with("id", json!("w-9"))
        .with("status", json!("completed"));
    h.engine.update_local(StoreId::Workouts, local).await.unwrap();

    assert!(h.engine.trigger_sync().await);

    let row = h.remote.row("workout_sessions", "w-9").unwrap();
    assert_eq!(row["status"], "completed");
    assert_eq!(row["id"], "w-9");
    assert_eq!(row["user_id"], USER);
}

#[tokio::test]
async fn update_local_fills_missing_principal() {
    let h = harness().await;
    let id = h
        .engine
        .update_local(StoreId::Goals, Record::new().with("id", json!("g-7")))
        .await
        .unwrap();

    let mine = h.store.for_principal(StoreId::Goals, USER).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id(), Some(id.as_str()));

    // An explicit owner is kept
    let other = Record::new()
        .with("id", json!("g-8"))
        .with("userId", json!("user-2"));
    h.engine.update_local(StoreId::Goals, other).await.unwrap();
    assert_eq!(h.store.for_principal(StoreId::Goals, "user-2").await.unwrap().len(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failing_operation_is_retried_exactly_max_retries_times() {
    let h = harness().await;
    h.remote.set_failure(Some(Failure::Unreachable));
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    for _ in 0..5 {
        assert!(!h.engine.trigger_sync().await);
    }
    assert_eq!(h.remote.call_count(), 5);
    assert_eq!(h.pending().await, 0);

    // Never retried again
    assert!(h.engine.trigger_sync().await);
    assert_eq!(h.remote.call_count(), 5);

    let dead = h.engine.queue().dead_letters(USER).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].operation.attempts, 5);
    assert!(!dead[0].permanent);
}

#[tokio::test]
async fn permanent_rejections_are_flagged_in_dead_letters() {
    let h = harness().await;
    h.engine
        .configure(SyncOptions::default().with_max_retries(1))
        .unwrap();
    h.remote.set_failure(Some(Failure::Rejected { status: 400 }));
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    let report = h.engine.sync_now().await.unwrap();
    assert_eq!(report.dropped, 1);
    assert!(!report.is_success());

    let dead = h.engine.queue().dead_letters(USER).await.unwrap();
    assert!(dead[0].permanent);
}

#[tokio::test]
async fn one_failing_store_does_not_block_others() {
    let h = harness().await;
    h.remote.fail_collection("fitness_goals", Failure::Unreachable);
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();
    h.engine.create_local(StoreId::Workouts, Record::new()).await.unwrap();

    let report = h.engine.sync_now().await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.retried, 1);

    let left = h.engine.queue().pending_for(USER).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].store, StoreId::Goals);
    assert_eq!(left[0].attempts, 1);
}

// ============================================================================
// Batching and progress
// ============================================================================

#[tokio::test]
async fn drains_in_batches_with_cumulative_progress() {
    let h = harness().await;
    h.enqueue_deletes(120).await;
    let progress = h.record_progress();

    assert!(h.engine.trigger_sync().await);

    assert_eq!(*progress.lock().unwrap(), vec![0, 50, 100, 120]);
    assert_eq!(h.remote.call_count(), 120);
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn offline_mid_drain_leaves_remaining_batches_untouched() {
    let h = harness().await;
    h.enqueue_deletes(120).await;
    let progress = h.record_progress();

    let monitor = Arc::clone(&h.monitor);
    h.remote.on_call(move |n, _| {
        if n == 50 {
            monitor.report_signal(false);
        }
    });

    assert!(!h.engine.trigger_sync().await);

    assert_eq!(*progress.lock().unwrap(), vec![0]);
    assert_eq!(h.remote.call_count(), 50);
    let left = h.engine.queue().pending_for(USER).await.unwrap();
    assert_eq!(left.len(), 70);
    assert!(left.iter().all(|op| op.attempts == 0));
    assert_eq!(left[0].record_id, "g-050");
    assert!(h.engine.get_last_sync_time().is_none());
}

#[tokio::test]
async fn removed_sync_listener_is_not_called() {
    let h = harness().await;
    let calls = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&calls);
    let id = h.engine.add_sync_listener(move |_| *sink.lock().unwrap() += 1);

    assert!(h.engine.remove_sync_listener(id));
    h.engine.trigger_sync().await;
    assert_eq!(*calls.lock().unwrap(), 0);
}

// ============================================================================
// Background triggers
// ============================================================================

#[tokio::test]
async fn auto_sync_drains_on_interval() {
    let h = harness().await;
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    h.engine
        .start_auto_sync(Some(Duration::from_millis(20)))
        .unwrap();
    assert!(h.engine.is_auto_sync_running());

    wait_until_drained(&h.engine).await;

    h.engine.stop_auto_sync();
    assert!(!h.engine.is_auto_sync_running());
    assert_eq!(h.remote.call_count(), 1);
}

#[tokio::test]
async fn zero_auto_sync_interval_is_rejected() {
    let h = harness().await;
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();

    let err = h.engine.start_auto_sync(Some(Duration::ZERO)).unwrap_err();
    assert!(matches!(err, SyncError::Engine(_)));
    assert!(!h.engine.is_auto_sync_running());

    // A running timer survives a rejected restart
    h.engine
        .start_auto_sync(Some(Duration::from_millis(20)))
        .unwrap();
    assert!(h.engine.start_auto_sync(Some(Duration::ZERO)).is_err());
    assert!(h.engine.is_auto_sync_running());
    wait_until_drained(&h.engine).await;
    h.engine.stop_auto_sync();
}

#[tokio::test]
async fn reconnect_triggers_sync() {
    let h = harness().await;
    h.monitor.report_signal(false);
    h.engine.watch_connectivity();
    h.engine.create_local(StoreId::Goals, Record::new()).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(h.remote.call_count(), 0);

    h.monitor.report_signal(true);

    wait_until_drained(&h.engine).await;
    assert_eq!(h.remote.call_count(), 1);
}

#[tokio::test]
async fn connection_listeners_follow_monitor() {
    let h = harness().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = h
        .engine
        .add_connection_listener(move |state| sink.lock().unwrap().push(*state));

    h.monitor.report_signal(false);
    assert_eq!(h.engine.get_connection_state(), ConnectionState::Offline);
    assert!(!h.engine.is_online());

    assert!(h.engine.remove_connection_listener(id));
    h.monitor.report_signal(true);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Online, ConnectionState::Offline]
    );
}
