//! Storage implementations.
//!
//! `StagedEventStore` owns the stage and the ship algorithm. It writes
//! through a [`Warehouse`], the document backend seam:
//! - `MemoryWarehouse`: in-process collections, used for tests and `type: memory`
//! - `MongoWarehouse`: MongoDB collections (feature `mongodb`)

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::event::{Event, Snapshot, Version};
use crate::interfaces::event_store::{EventStore, Result};
use crate::retrieve::EventQuery;

pub mod history;
pub mod memory;
pub mod staged;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use history::InsertionHistory;
pub use memory::MemoryWarehouse;
pub use staged::StagedEventStore;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoWarehouse;

/// Default collection names.
pub const EVENTS_COLLECTION: &str = "events";
pub const SNAPSHOTS_COLLECTION: &str = "snapshots";

/// Document backend for events and snapshots.
///
/// Events and snapshots live in separate collections. Writes happen inside a
/// session and return the backend's document id so a failed ship can delete
/// exactly what it inserted.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Groups the writes of one ship.
    type Session: Send;
    /// Backend document identifier.
    type DocumentId: Clone + Debug + Send + Sync;

    async fn start_session(&self) -> Result<Self::Session>;

    async fn insert_event(
        &self,
        session: &mut Self::Session,
        event: &Event,
    ) -> Result<Self::DocumentId>;

    async fn insert_snapshot(
        &self,
        session: &mut Self::Session,
        snapshot: &Snapshot,
    ) -> Result<Self::DocumentId>;

    /// Delete documents by id from the named collection.
    async fn delete_documents(
        &self,
        session: &mut Self::Session,
        collection: &str,
        ids: &[Self::DocumentId],
    ) -> Result<()>;

    /// Highest stored event version for the subject, read within the session.
    async fn tail_version(
        &self,
        session: &mut Self::Session,
        subject: &str,
    ) -> Result<Option<Version>>;

    async fn latest_event(&self, subject: &str) -> Result<Option<Event>>;

    async fn latest_snapshot(&self, subject: &str) -> Result<Option<Snapshot>>;

    /// Events matching the query, ascending by version.
    async fn find_events(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// Snapshots for the subject, ascending by version.
    async fn find_snapshots(&self, subject: &str) -> Result<Vec<Snapshot>>;

    fn events_collection(&self) -> &str;

    fn snapshots_collection(&self) -> &str;
}

/// Initialize the event store based on configuration.
pub async fn init_store(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn EventStore>, Box<dyn std::error::Error + Send + Sync>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Event store initialized");
            Ok(Arc::new(
                StagedEventStore::new(MemoryWarehouse::new())
                    .with_schema_version(config.schema_version),
            ))
        }
        StorageType::Mongodb => {
            #[cfg(feature = "mongodb")]
            {
                let warehouse = MongoWarehouse::connect(&config.mongodb).await?;
                info!(
                    storage_type = "mongodb",
                    database = %config.mongodb.database,
                    "Event store initialized"
                );
                Ok(Arc::new(
                    StagedEventStore::new(warehouse).with_schema_version(config.schema_version),
                ))
            }

            #[cfg(not(feature = "mongodb"))]
            {
                tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
                Err("MongoDB support requires the 'mongodb' feature. Rebuild with --features mongodb".into())
            }
        }
    }
}
