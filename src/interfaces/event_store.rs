//! Event storage interface.

use async_trait::async_trait;

use crate::event::{Event, EventData, Snapshot, SubjectId, Timestamp, Title, Version};
use crate::retrieve::RetrieveOptions;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Event data cannot be nil")]
    NilData,

    #[error("Event data batch is empty")]
    NoEventData,

    #[error("Event store does not have any events for subject {subject}")]
    NoEvents { subject: SubjectId },

    #[error("Event store does not have any snapshots for subject {subject}")]
    NoSnapshots { subject: SubjectId },

    #[error("Stage out of sync for subject {subject}: expected first staged version {expected}, got {actual}")]
    StageOutOfSync {
        subject: SubjectId,
        expected: Version,
        actual: Version,
    },

    #[error("Payload tagged {actual} cannot be decoded as {expected}")]
    PayloadMismatch { expected: Title, actual: Title },

    #[error("Invalid retrieve options: {0}")]
    InvalidOptions(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Insertion failed: {0}")]
    Insertion(String),

    #[error("Deletion failed: {0}")]
    Deletion(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON serialization error: {0}")]
    BsonSerialize(#[from] mongodb::bson::ser::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON deserialization error: {0}")]
    BsonDeserialize(#[from] mongodb::bson::de::Error),

    #[error("Shipping subject {subject} failed, rollback successful")]
    RolledBack {
        subject: SubjectId,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Shipping subject {subject} failed ({source}) and rollback failed: {rollback}")]
    RollbackFailed {
        subject: SubjectId,
        #[source]
        source: Box<StoreError>,
        rollback: Box<StoreError>,
    },

    #[error("Shipped {} events before failing: {source}", .shipped.len())]
    PartialShip {
        shipped: Vec<Event>,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// The failure that caused a rollback, or `self` when no rollback happened.
    pub fn cause(&self) -> &StoreError {
        match self {
            StoreError::RolledBack { source, .. }
            | StoreError::RollbackFailed { source, .. }
            | StoreError::PartialShip { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Staged events do not continue the remote tail.
    pub fn is_conflict(&self) -> bool {
        matches!(self.cause(), StoreError::StageOutOfSync { .. })
    }

    /// No events or snapshots exist yet for the subject.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.cause(),
            StoreError::NoEvents { .. } | StoreError::NoSnapshots { .. }
        )
    }

    /// Compensation failed; documents from the failed ship may remain.
    pub fn is_rollback_failure(&self) -> bool {
        match self {
            StoreError::PartialShip { source, .. } => source.is_rollback_failure(),
            other => matches!(other, StoreError::RollbackFailed { .. }),
        }
    }

    /// Events a failed ship had already written durably for earlier subjects.
    pub fn shipped(&self) -> &[Event] {
        match self {
            StoreError::PartialShip { shipped, .. } => shipped,
            _ => &[],
        }
    }
}

/// Latest-version lookup used by the event and snapshot factories.
///
/// Implementations decide precedence. The staged store answers from the
/// stage first and falls back to durable storage.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest event for the subject by version.
    ///
    /// Fails with `NoEvents` when the subject has none.
    async fn latest_event(&self, subject: &str) -> Result<Event>;

    /// Latest snapshot for the subject by snapshot version.
    ///
    /// Fails with `NoSnapshots` when the subject has none.
    async fn latest_snapshot(&self, subject: &str) -> Result<Snapshot>;
}

/// Interface for event persistence.
///
/// Events are buffered per subject in a stage by `load`/`snapshot` and
/// written durably by `ship`. Every read returns events ascending by version.
///
/// Implementations:
/// - `StagedEventStore<MongoWarehouse>`: MongoDB storage
/// - `StagedEventStore<MemoryWarehouse>`: in-memory storage for tests
#[async_trait]
pub trait EventStore: VersionSource {
    /// Create a batch of events and write it immediately, bypassing the stage.
    ///
    /// Versions continue the durable tail and ignore staged events, so a
    /// subject with staged events fails its next `ship` as out of sync.
    async fn send(
        &self,
        producer: &str,
        subject: &str,
        data: Vec<EventData>,
    ) -> Result<Vec<Event>>;

    /// Create the next event for the subject and append it to the stage.
    ///
    /// Does not touch durable storage.
    async fn load(&self, producer: &str, subject: &str, data: EventData) -> Result<Event>;

    /// Create the next snapshot for the subject and stage it.
    ///
    /// Closes the subject's current event group.
    async fn snapshot(&self, producer: &str, subject: &str, data: EventData) -> Result<Snapshot>;

    /// Durably write everything staged.
    ///
    /// Returns the shipped events, ordered by version within each subject.
    /// When a later subject fails after earlier ones were written, the error
    /// is `PartialShip` and carries the written events.
    async fn ship(&self) -> Result<Vec<Event>>;

    /// Discard everything staged without persisting.
    async fn clear(&self);

    /// Events currently staged across all subjects.
    async fn staged_events(&self) -> Vec<Event>;

    /// True when no subject has staged events or snapshots.
    async fn is_stage_empty(&self) -> bool;

    /// All events for a subject.
    async fn concerning(&self, subject: &str) -> Result<Vec<Event>>;

    /// All events created by a producer.
    async fn by(&self, producer: &str) -> Result<Vec<Event>>;

    /// Events with versions in `[from, to]`.
    async fn between(&self, subject: &str, from: Version, to: Version) -> Result<Vec<Event>>;

    /// Events created while the given snapshot version was the latest.
    async fn with(&self, subject: &str, snapshot_version: Version) -> Result<Vec<Event>>;

    /// Events with timestamps strictly before `point_in_time`.
    async fn before(&self, subject: &str, point_in_time: Timestamp) -> Result<Vec<Event>>;

    /// Events with timestamps strictly after `point_in_time`.
    async fn after(&self, subject: &str, point_in_time: Timestamp) -> Result<Vec<Event>>;

    /// Events with timestamps in `[from, to]`.
    async fn temporal(&self, subject: &str, from: Timestamp, to: Timestamp)
        -> Result<Vec<Event>>;

    /// Events matching arbitrary retrieve options.
    async fn retrieve(&self, subject: &str, options: RetrieveOptions) -> Result<Vec<Event>>;

    /// All snapshots for a subject, ascending by snapshot version.
    async fn snapshots(&self, subject: &str) -> Result<Vec<Snapshot>>;
}
