use super::*;
use crate::retrieve::RetrieveOptions;
use crate::test_utils::{sample_event, sample_snapshot};

#[tokio::test]
async fn test_insert_and_find_events() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    warehouse
        .insert_event(&mut session, &sample_event("acct-1", 1))
        .await
        .unwrap();
    warehouse
        .insert_event(&mut session, &sample_event("acct-1", 0))
        .await
        .unwrap();
    warehouse
        .insert_event(&mut session, &sample_event("acct-2", 0))
        .await
        .unwrap();

    let events = warehouse
        .find_events(&EventQuery::subject("acct-1"))
        .await
        .unwrap();

    let versions: Vec<_> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![0, 1]);
    assert_eq!(warehouse.sessions_started(), 1);
}

#[tokio::test]
async fn test_duplicate_version_is_rejected() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    warehouse
        .insert_event(&mut session, &sample_event("acct-1", 0))
        .await
        .unwrap();

    let err = warehouse
        .insert_event(&mut session, &sample_event("acct-1", 0))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Insertion(_)));
    assert_eq!(warehouse.event_count().await, 1);
}

#[tokio::test]
async fn test_fail_on_insert_after_budget() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    warehouse.set_fail_on_insert_after(1).await;

    assert!(warehouse
        .insert_event(&mut session, &sample_event("acct-1", 0))
        .await
        .is_ok());
    assert!(warehouse
        .insert_event(&mut session, &sample_event("acct-1", 1))
        .await
        .is_err());

    warehouse.clear_fail_on_insert().await;
    assert!(warehouse
        .insert_event(&mut session, &sample_event("acct-1", 1))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_delete_documents_by_collection() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    let event_id = warehouse
        .insert_event(&mut session, &sample_event("acct-1", 0))
        .await
        .unwrap();
    let snapshot_id = warehouse
        .insert_snapshot(&mut session, &sample_snapshot("acct-1", 1))
        .await
        .unwrap();

    warehouse
        .delete_documents(&mut session, EVENTS_COLLECTION, &[event_id])
        .await
        .unwrap();
    warehouse
        .delete_documents(&mut session, SNAPSHOTS_COLLECTION, &[snapshot_id])
        .await
        .unwrap();

    assert_eq!(warehouse.event_count().await, 0);
    assert_eq!(warehouse.snapshot_count().await, 0);
}

#[tokio::test]
async fn test_delete_failure_injection() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    warehouse.set_fail_on_delete(true).await;

    let err = warehouse
        .delete_documents(&mut session, EVENTS_COLLECTION, &[1])
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Deletion(_)));
}

#[tokio::test]
async fn test_latest_and_tail() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    assert_eq!(
        warehouse.tail_version(&mut session, "acct-1").await.unwrap(),
        None
    );

    for version in 0..3 {
        warehouse
            .insert_event(&mut session, &sample_event("acct-1", version))
            .await
            .unwrap();
    }
    warehouse
        .insert_snapshot(&mut session, &sample_snapshot("acct-1", 1))
        .await
        .unwrap();
    warehouse
        .insert_snapshot(&mut session, &sample_snapshot("acct-1", 2))
        .await
        .unwrap();

    assert_eq!(
        warehouse.tail_version(&mut session, "acct-1").await.unwrap(),
        Some(2)
    );
    assert_eq!(
        warehouse
            .latest_snapshot("acct-1")
            .await
            .unwrap()
            .map(|s| s.version),
        Some(2)
    );
    assert_eq!(warehouse.find_snapshots("acct-1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_find_events_applies_options() {
    let warehouse = MemoryWarehouse::new();
    let mut session = warehouse.start_session().await.unwrap();
    for version in 0..5 {
        warehouse
            .insert_event(&mut session, &sample_event("acct-1", version))
            .await
            .unwrap();
    }

    let query =
        EventQuery::subject("acct-1").with_options(RetrieveOptions::versions(1, 3).unwrap());
    let events = warehouse.find_events(&query).await.unwrap();

    let versions: Vec<_> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}
