//! MongoDB Warehouse implementation.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, from_document, to_document, Bson, Document};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tracing::{debug, info};

use super::{
    EVENT_KEY, EVENT_PRODUCER, EVENT_SNAPSHOT_VERSION, EVENT_SUBJECT, EVENT_TIMESTAMP,
    EVENT_VERSION, SNAPSHOT_KEY, SNAPSHOT_SUBJECT, SNAPSHOT_VERSION,
};
use crate::config::MongodbConfig;
use crate::event::{Event, Snapshot, Version};
use crate::interfaces::event_store::{Result, StoreError};
use crate::retrieve::EventQuery;
use crate::storage::Warehouse;

/// Versions are unsigned in memory and Int64 in BSON.
fn to_i64(version: Version) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn unwrap_document<T: serde::de::DeserializeOwned>(document: &Document, key: &str) -> Result<T> {
    let inner = document
        .get_document(key)
        .map_err(|e| StoreError::MalformedDocument(format!("{key}: {e}")))?;
    Ok(from_document(inner.clone())?)
}

/// Build the events filter for a query.
fn event_filter(query: &EventQuery) -> Document {
    let mut filter = Document::new();

    if let Some(subject) = &query.subject {
        filter.insert(EVENT_SUBJECT, subject.clone());
    }
    if let Some(producer) = &query.producer {
        filter.insert(EVENT_PRODUCER, producer.clone());
    }
    if let Some(snapshot_version) = query.snapshot_version {
        filter.insert(EVENT_SNAPSHOT_VERSION, to_i64(snapshot_version));
    }

    let options = &query.options;
    let mut version = Document::new();
    if let Some(min) = options.min_version {
        version.insert("$gte", to_i64(min));
    }
    if let Some(max) = options.max_version {
        version.insert("$lte", to_i64(max));
    }
    if !version.is_empty() {
        filter.insert(EVENT_VERSION, version);
    }

    let mut timestamp = Document::new();
    if let Some(min) = options.min_timestamp {
        timestamp.insert("$gte", min);
    }
    if let Some(max) = options.max_timestamp {
        timestamp.insert("$lte", max);
    }
    if !timestamp.is_empty() {
        filter.insert(EVENT_TIMESTAMP, timestamp);
    }

    filter
}

/// MongoDB implementation of Warehouse.
pub struct MongoWarehouse {
    client: Client,
    events: Collection<Document>,
    snapshots: Collection<Document>,
}

impl MongoWarehouse {
    /// Connect using the configured URI and timeouts.
    pub async fn connect(config: &MongodbConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(config.uri.as_str()).await?;
        let timeout = Duration::from_secs(config.timeout_secs);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        info!(
            database = %config.database,
            events = %config.events_collection,
            snapshots = %config.snapshots_collection,
            "Connected to MongoDB"
        );

        Self::new(
            &client,
            &config.database,
            &config.events_collection,
            &config.snapshots_collection,
        )
        .await
    }

    /// Create a warehouse over an existing client.
    pub async fn new(
        client: &Client,
        database_name: &str,
        events_collection: &str,
        snapshots_collection: &str,
    ) -> Result<Self> {
        let database = client.database(database_name);
        let warehouse = Self {
            client: client.clone(),
            events: database.collection(events_collection),
            snapshots: database.collection(snapshots_collection),
        };
        warehouse.init().await?;

        Ok(warehouse)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // Unique (subject, version) so concurrent writers fail on insert
        let event_index = IndexModel::builder()
            .keys(doc! { EVENT_SUBJECT: 1, EVENT_VERSION: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.events.create_index(event_index).await?;

        let producer_index = IndexModel::builder()
            .keys(doc! { EVENT_PRODUCER: 1 })
            .build();
        self.events.create_index(producer_index).await?;

        let snapshot_index = IndexModel::builder()
            .keys(doc! { SNAPSHOT_SUBJECT: 1, SNAPSHOT_VERSION: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.snapshots.create_index(snapshot_index).await?;

        Ok(())
    }

    fn collection(&self, name: &str) -> Result<&Collection<Document>> {
        if name == self.events.name() {
            Ok(&self.events)
        } else if name == self.snapshots.name() {
            Ok(&self.snapshots)
        } else {
            Err(StoreError::Deletion(format!("unknown collection {name}")))
        }
    }
}

#[async_trait]
impl Warehouse for MongoWarehouse {
    type Session = ClientSession;
    type DocumentId = Bson;

    async fn start_session(&self) -> Result<ClientSession> {
        Ok(self.client.start_session().await?)
    }

    async fn insert_event(&self, session: &mut ClientSession, event: &Event) -> Result<Bson> {
        let document = doc! { EVENT_KEY: to_document(event)? };
        let result = self
            .events
            .insert_one(document)
            .session(&mut *session)
            .await?;
        debug!(
            subject = %event.subject,
            version = event.version,
            "Inserted event document"
        );
        Ok(result.inserted_id)
    }

    async fn insert_snapshot(
        &self,
        session: &mut ClientSession,
        snapshot: &Snapshot,
    ) -> Result<Bson> {
        let document = doc! { SNAPSHOT_KEY: to_document(snapshot)? };
        let result = self
            .snapshots
            .insert_one(document)
            .session(&mut *session)
            .await?;
        Ok(result.inserted_id)
    }

    async fn delete_documents(
        &self,
        session: &mut ClientSession,
        collection: &str,
        ids: &[Bson],
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let filter = doc! { "_id": { "$in": ids.to_vec() } };
        let result = self
            .collection(collection)?
            .delete_many(filter)
            .session(&mut *session)
            .await?;

        if result.deleted_count != ids.len() as u64 {
            return Err(StoreError::Deletion(format!(
                "deleted {} of {} documents from {collection}",
                result.deleted_count,
                ids.len()
            )));
        }
        Ok(())
    }

    async fn tail_version(
        &self,
        session: &mut ClientSession,
        subject: &str,
    ) -> Result<Option<Version>> {
        let found = self
            .events
            .find_one(doc! { EVENT_SUBJECT: subject })
            .sort(doc! { EVENT_VERSION: -1 })
            .session(&mut *session)
            .await?;

        match found {
            Some(document) => Ok(Some(unwrap_document::<Event>(&document, EVENT_KEY)?.version)),
            None => Ok(None),
        }
    }

    async fn latest_event(&self, subject: &str) -> Result<Option<Event>> {
        let found = self
            .events
            .find_one(doc! { EVENT_SUBJECT: subject })
            .sort(doc! { EVENT_VERSION: -1 })
            .await?;

        found
            .map(|document| unwrap_document(&document, EVENT_KEY))
            .transpose()
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Option<Snapshot>> {
        let found = self
            .snapshots
            .find_one(doc! { SNAPSHOT_SUBJECT: subject })
            .sort(doc! { SNAPSHOT_VERSION: -1 })
            .await?;

        found
            .map(|document| unwrap_document(&document, SNAPSHOT_KEY))
            .transpose()
    }

    async fn find_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let filter = event_filter(query);
        let options = FindOptions::builder()
            .sort(doc! { EVENT_VERSION: 1 })
            .build();

        let mut cursor = self.events.find(filter).with_options(options).await?;

        let mut events = Vec::new();
        while cursor.advance().await? {
            let document = cursor.deserialize_current()?;
            events.push(unwrap_document(&document, EVENT_KEY)?);
        }

        debug!(count = events.len(), "Event query completed");
        Ok(events)
    }

    async fn find_snapshots(&self, subject: &str) -> Result<Vec<Snapshot>> {
        let options = FindOptions::builder()
            .sort(doc! { SNAPSHOT_VERSION: 1 })
            .build();

        let mut cursor = self
            .snapshots
            .find(doc! { SNAPSHOT_SUBJECT: subject })
            .with_options(options)
            .await?;

        let mut snapshots = Vec::new();
        while cursor.advance().await? {
            let document = cursor.deserialize_current()?;
            snapshots.push(unwrap_document(&document, SNAPSHOT_KEY)?);
        }
        Ok(snapshots)
    }

    fn events_collection(&self) -> &str {
        self.events.name()
    }

    fn snapshots_collection(&self) -> &str {
        self.snapshots.name()
    }
}
