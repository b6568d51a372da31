//! MongoDB warehouse integration tests.
//!
//! Run with: cargo test --test storage_mongodb --features mongodb -- --ignored --nocapture
//!
//! Requires: MONGODB_URI env var or MongoDB on localhost:27017

use eventstage::event::EventData;
use eventstage::interfaces::EventStore;
use eventstage::storage::{MongoWarehouse, StagedEventStore, Warehouse};
use eventstage::StoreError;
use eventstage::VersionSource;
use serde_json::json;
use uuid::Uuid;

fn mongodb_uri() -> String {
    std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

fn mongodb_database() -> String {
    std::env::var("MONGODB_DATABASE").unwrap_or_else(|_| "eventstage_test".to_string())
}

fn deposit(amount: u64) -> EventData {
    EventData::new("Deposited", json!({ "amount": amount }))
}

/// Fresh collections per test so parallel runs do not interfere.
async fn store() -> StagedEventStore<MongoWarehouse> {
    let client = mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB");
    let suffix = Uuid::new_v4().simple().to_string();

    let warehouse = MongoWarehouse::new(
        &client,
        &mongodb_database(),
        &format!("events_{suffix}"),
        &format!("snapshots_{suffix}"),
    )
    .await
    .expect("Failed to create warehouse");

    StagedEventStore::new(warehouse)
}

async fn drop_collections(client: &mongodb::Client, store: &StagedEventStore<MongoWarehouse>) {
    let db = client.database(&mongodb_database());
    for name in [
        store.warehouse().events_collection(),
        store.warehouse().snapshots_collection(),
    ] {
        let _ = db
            .collection::<mongodb::bson::Document>(name)
            .drop()
            .await;
    }
}

#[tokio::test]
#[ignore = "requires running MongoDB instance"]
async fn test_mongodb_ship_and_read() {
    println!("Connecting to: {}", mongodb_uri());
    let client = mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB");
    let store = store().await;

    store.load("svc", "acct-1", deposit(1)).await.unwrap();
    store.load("svc", "acct-1", deposit(2)).await.unwrap();
    let snapshot = store
        .snapshot("svc", "acct-1", EventData::new("Balance", json!({ "balance": 3 })))
        .await
        .unwrap();
    store.load("svc", "acct-1", deposit(3)).await.unwrap();

    let shipped = store.ship().await.expect("ship failed");
    assert_eq!(shipped.len(), 3);

    let stored = store.concerning("acct-1").await.unwrap();
    assert_eq!(
        stored.iter().map(|e| e.version).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(store.between("acct-1", 1, 2).await.unwrap().len(), 2);
    assert_eq!(store.by("svc").await.unwrap().len(), 3);
    assert_eq!(store.with("acct-1", snapshot.version).await.unwrap().len(), 1);
    assert_eq!(store.snapshots("acct-1").await.unwrap().len(), 1);

    let latest = store.latest_event("acct-1").await.unwrap();
    assert_eq!(latest.version, 2);

    drop_collections(&client, &store).await;
    println!("=== MongoDB ship/read test PASSED ===");
}

#[tokio::test]
#[ignore = "requires running MongoDB instance"]
async fn test_mongodb_conflicting_writer_is_detected() {
    let client = mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB");
    let store = store().await;

    store.load("svc", "acct-1", deposit(1)).await.unwrap();
    store
        .send("other", "acct-1", vec![deposit(9), deposit(9)])
        .await
        .unwrap();

    let err = store.ship().await.unwrap_err();

    assert!(err.is_conflict(), "unexpected error: {err}");
    assert!(matches!(
        err.cause(),
        StoreError::StageOutOfSync {
            expected: 2,
            actual: 0,
            ..
        }
    ));
    assert_eq!(store.concerning("acct-1").await.unwrap().len(), 2);

    drop_collections(&client, &store).await;
}

#[tokio::test]
#[ignore = "requires running MongoDB instance"]
async fn test_mongodb_rollback_deletes_inserted_documents() {
    let client = mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB");
    let store = store().await;
    let warehouse = store.warehouse();

    let mut session = warehouse.start_session().await.unwrap();
    let first = store.send("svc", "acct-1", vec![deposit(1)]).await.unwrap();
    let id = warehouse
        .insert_event(&mut session, &{
            let mut event = first[0].clone();
            event.subject = "acct-2".to_string();
            event
        })
        .await
        .unwrap();

    // Unique (subject, version) index rejects the duplicate
    let duplicate = warehouse.insert_event(&mut session, &first[0]).await;
    assert!(duplicate.is_err());

    warehouse
        .delete_documents(&mut session, warehouse.events_collection(), &[id])
        .await
        .unwrap();
    assert!(store.concerning("acct-2").await.unwrap().is_empty());
    assert_eq!(store.concerning("acct-1").await.unwrap().len(), 1);

    drop_collections(&client, &store).await;
}
