//! Kafka event stream integration tests.
//!
//! Run with: cargo test --test stream_kafka --features kafka -- --ignored --nocapture
//!
//! Requires: KAFKA_BOOTSTRAP_SERVERS env var or a broker on localhost:9092
//! with topic auto-creation enabled.

#![cfg(feature = "kafka")]

use std::time::Duration;

use eventstage::bus::{cancellation, EventStream, KafkaEventStream, KafkaStreamConfig};
use eventstage::event::EventData;
use eventstage::interfaces::EventStore;
use eventstage::storage::{MemoryWarehouse, StagedEventStore};
use serde_json::json;
use uuid::Uuid;

fn bootstrap_servers() -> String {
    std::env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

#[tokio::test]
#[ignore = "requires running Kafka broker"]
async fn test_kafka_publish_subscribe_round_trip() {
    let topic = format!("eventstage-test-{}", Uuid::new_v4().simple());
    let group = format!("eventstage-test-{}", Uuid::new_v4().simple());
    println!("Using broker {} topic {}", bootstrap_servers(), topic);

    let stream = KafkaEventStream::new(KafkaStreamConfig::subscriber(
        bootstrap_servers(),
        &topic,
        group,
    ))
    .expect("Failed to create Kafka stream");

    let store = StagedEventStore::new(MemoryWarehouse::new());
    for amount in 1..=3 {
        store
            .load(
                "svc",
                "acct-1",
                EventData::new("Deposited", json!({ "amount": amount })),
            )
            .await
            .unwrap();
    }
    let shipped = store.ship().await.unwrap();

    let (handle, cancel) = cancellation();
    let mut subscription = stream
        .subscribe(&topic, cancel)
        .await
        .expect("Failed to subscribe");

    stream.publish(&shipped).await.expect("Failed to publish");

    let mut received = Vec::new();
    while received.len() < shipped.len() {
        let event = tokio::time::timeout(Duration::from_secs(30), subscription.events.recv())
            .await
            .expect("Timed out waiting for events")
            .expect("Subscription closed early");
        received.push(event);
    }

    // Same key, same partition: order is preserved
    assert_eq!(received, shipped);

    handle.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(10), subscription.events.recv())
        .await
        .expect("Reader did not stop after cancel");
    assert!(closed.is_none());
}
