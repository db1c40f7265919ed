//! Integration tests for the local store.
//!
//! Every test runs against its own in-memory SQLite database.

use serde_json::json;
use stride_client::{LocalStore, StoreError};
use stride_engine::{Record, Schema, StoreId};

async fn open_store() -> LocalStore {
    let store = LocalStore::in_memory(Schema::standard().unwrap());
    store.init().await.unwrap();
    store
}

fn workout(id: &str, user: &str, date: &str, status: &str) -> Record {
    Record::new()
        .with("id", json!(id))
        .with("userId", json!(user))
        .with("date", json!(date))
        .with("status", json!(status))
        .with("totalVolumeKg", json!(8_250.5))
        .with("lastUpdated", json!(1_709_280_000_000u64))
}

fn checkin(id: &str, user: &str, date: &str) -> Record {
    Record::new()
        .with("id", json!(id))
        .with("userId", json!(user))
        .with("date", json!(date))
        .with("mood", json!(4))
}

#[tokio::test]
async fn crud_round_trip() {
    let store = open_store().await;
    let record = workout("w-1", "user-1", "2024-03-01", "planned");

    let id = store.add(StoreId::Workouts, record.clone()).await.unwrap();
    assert_eq!(id, "w-1");
    assert_eq!(store.get(StoreId::Workouts, "w-1").await.unwrap(), Some(record));

    store.delete(StoreId::Workouts, "w-1").await.unwrap();
    assert_eq!(store.get(StoreId::Workouts, "w-1").await.unwrap(), None);
}

#[tokio::test]
async fn add_assigns_missing_id() {
    let store = open_store().await;
    let record = Record::new()
        .with("userId", json!("user-1"))
        .with("title", json!("Run 5k"));

    let id = store.add(StoreId::Goals, record).await.unwrap();
    assert!(!id.is_empty());

    let stored = store.get(StoreId::Goals, &id).await.unwrap().unwrap();
    assert_eq!(stored.id(), Some(id.as_str()));
    assert_eq!(stored.get("title"), Some(&json!("Run 5k")));
}

#[tokio::test]
async fn add_rejects_duplicate_id() {
    let store = open_store().await;
    let record = workout("w-1", "user-1", "2024-03-01", "planned");
    store.add(StoreId::Workouts, record.clone()).await.unwrap();

    let err = store.add(StoreId::Workouts, record).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::UniqueViolation {
            store: StoreId::Workouts
        }
    ));
}

#[tokio::test]
async fn one_checkin_per_principal_per_day() {
    let store = open_store().await;
    store
        .add(StoreId::DailyCheckins, checkin("c-1", "user-1", "2024-03-01"))
        .await
        .unwrap();

    // Same principal, same day
    let err = store
        .add(StoreId::DailyCheckins, checkin("c-2", "user-1", "2024-03-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));

    // Another principal or another day is fine
    store
        .add(StoreId::DailyCheckins, checkin("c-3", "user-2", "2024-03-01"))
        .await
        .unwrap();
    store
        .add(StoreId::DailyCheckins, checkin("c-4", "user-1", "2024-03-02"))
        .await
        .unwrap();
    assert_eq!(store.count(StoreId::DailyCheckins).await.unwrap(), 3);
}

#[tokio::test]
async fn update_is_upsert() {
    let store = open_store().await;

    // Insert through update
    let record = workout("w-1", "user-1", "2024-03-01", "planned");
    store.update(StoreId::Workouts, &record).await.unwrap();
    assert_eq!(store.count(StoreId::Workouts).await.unwrap(), 1);

    // Replace
    let done = record.with("status", json!("completed"));
    store.update(StoreId::Workouts, &done).await.unwrap();
    assert_eq!(store.count(StoreId::Workouts).await.unwrap(), 1);
    assert_eq!(store.get(StoreId::Workouts, "w-1").await.unwrap(), Some(done));
}

#[tokio::test]
async fn update_requires_id() {
    let store = open_store().await;
    let err = store
        .update(StoreId::Goals, &Record::new().with("title", json!("x")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Engine(_)));
}

#[tokio::test]
async fn delete_missing_is_noop() {
    let store = open_store().await;
    store.delete(StoreId::Profiles, "nobody").await.unwrap();
}

#[tokio::test]
async fn index_lookups() {
    let store = open_store().await;
    store
        .add(StoreId::Workouts, workout("w-1", "user-1", "2024-03-01", "planned"))
        .await
        .unwrap();
    store
        .add(StoreId::Workouts, workout("w-2", "user-1", "2024-03-02", "completed"))
        .await
        .unwrap();
    store
        .add(StoreId::Workouts, workout("w-3", "user-2", "2024-03-01", "completed"))
        .await
        .unwrap();

    let on_day = store
        .get_by_index(StoreId::Workouts, "by_date", &json!("2024-03-01"))
        .await
        .unwrap();
    let ids: Vec<_> = on_day.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec!["w-1", "w-3"]);

    let completed = store
        .get_by_index(StoreId::Workouts, "by_status", &json!("completed"))
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);

    let mine = store.for_principal(StoreId::Workouts, "user-1").await.unwrap();
    let ids: Vec<_> = mine.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec!["w-1", "w-2"]);
}

#[tokio::test]
async fn composite_and_boolean_indexes() {
    let store = open_store().await;
    store
        .add(StoreId::DailyCheckins, checkin("c-1", "user-1", "2024-03-01"))
        .await
        .unwrap();
    store
        .add(StoreId::DailyCheckins, checkin("c-2", "user-1", "2024-03-02"))
        .await
        .unwrap();

    let found = store
        .get_by_index(
            StoreId::DailyCheckins,
            "by_principal_date",
            &json!(["user-1", "2024-03-02"]),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), Some("c-2"));

    for (id, active) in [("p-1", true), ("p-2", false)] {
        store
            .add(
                StoreId::TrainingPlans,
                Record::new()
                    .with("id", json!(id))
                    .with("userId", json!("user-1"))
                    .with("isActive", json!(active)),
            )
            .await
            .unwrap();
    }
    let active = store
        .get_by_index(StoreId::TrainingPlans, "by_active", &json!(true))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), Some("p-1"));
}

#[tokio::test]
async fn bad_index_lookups_fail() {
    let store = open_store().await;

    let err = store
        .get_by_index(StoreId::Profiles, "by_date", &json!("2024-03-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Engine(_)));

    let err = store
        .get_by_index(StoreId::DailyCheckins, "by_principal_date", &json!("user-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Engine(_)));
}

#[tokio::test]
async fn get_all_count_and_clear() {
    let store = open_store().await;
    for id in ["m-3", "m-1", "m-2"] {
        store
            .add(
                StoreId::BodyMetrics,
                Record::new()
                    .with("id", json!(id))
                    .with("userId", json!("user-1"))
                    .with("weightKg", json!(72.4)),
            )
            .await
            .unwrap();
    }

    let all = store.get_all(StoreId::BodyMetrics).await.unwrap();
    let ids: Vec<_> = all.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
    assert_eq!(store.count(StoreId::BodyMetrics).await.unwrap(), 3);

    store.clear(StoreId::BodyMetrics).await.unwrap();
    assert_eq!(store.count(StoreId::BodyMetrics).await.unwrap(), 0);
}

#[tokio::test]
async fn stores_are_isolated() {
    let store = open_store().await;
    store
        .add(StoreId::Goals, Record::new().with("id", json!("x-1")))
        .await
        .unwrap();
    assert_eq!(store.get(StoreId::TrainingPlans, "x-1").await.unwrap(), None);
    assert_eq!(store.count(StoreId::TrainingPlans).await.unwrap(), 0);
}

#[tokio::test]
async fn init_is_idempotent() {
    let store = open_store().await;
    store
        .add(StoreId::Goals, Record::new().with("id", json!("g-1")))
        .await
        .unwrap();

    store.init().await.unwrap();
    assert_eq!(store.count(StoreId::Goals).await.unwrap(), 1);
}

#[tokio::test]
async fn closed_store_is_unavailable() {
    let store = open_store().await;
    store.close().await;
    assert!(!store.is_open().await);

    let err = store
        .add(StoreId::Goals, Record::new().with("id", json!("g-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(store.count(StoreId::Goals).await.is_err());
}

#[tokio::test]
async fn bad_location_fails_init() {
    let store = LocalStore::new(
        "sqlite:///nonexistent-dir/stride/db.sqlite",
        Schema::standard().unwrap(),
    );
    let err = store.init().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(!store.is_open().await);
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("stride.db").display());

    let store = LocalStore::new(&url, Schema::standard().unwrap());
    store.init().await.unwrap();
    store
        .add(StoreId::Profiles, Record::new().with("id", json!("p-1")).with("userId", json!("user-1")))
        .await
        .unwrap();
    store.close().await;

    let reopened = LocalStore::new(&url, Schema::standard().unwrap());
    reopened.init().await.unwrap();
    let profile = reopened.get(StoreId::Profiles, "p-1").await.unwrap();
    assert_eq!(profile.and_then(|p| p.id().map(str::to_string)), Some("p-1".into()));
}
