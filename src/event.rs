//! Event and snapshot records plus the factories that version them.
//!
//! Events carry a strictly increasing per-subject `version` starting at
//! [`INITIAL_EVENT_VERSION`]. Snapshots carry an independent per-subject
//! sequence starting at [`FIRST_SNAPSHOT_VERSION`], so events created before
//! any snapshot keep `snapshot_version == 0`.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interfaces::event_store::{Result, StoreError, VersionSource};

pub type ProducerId = String;
pub type SubjectId = String;
pub type Title = String;
pub type Ident = String;
pub type Version = u64;
/// Unix time in seconds.
pub type Timestamp = i64;
pub type Data = serde_json::Value;

pub const INITIAL_EVENT_VERSION: Version = 0;
pub const INITIAL_SNAPSHOT_VERSION: Version = 0;
pub const FIRST_SNAPSHOT_VERSION: Version = 1;
pub const INITIAL_SCHEMA_VERSION: Version = 0;
pub const BEGINNING_OF_TIME: Timestamp = 0;
pub const END_OF_TIME: Timestamp = i64::MAX;

/// A domain payload with a stable dispatch tag.
///
/// `NAME` is what lands in `Event::name` and what the mediator routes on.
/// It must not change once events carrying it have been stored.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;
}

/// An encoded payload together with its tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub name: Title,
    pub data: Data,
}

impl EventData {
    pub fn new(name: impl Into<Title>, data: Data) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Encode a typed payload, tagging it with `P::NAME`.
    pub fn encode<P: Payload>(payload: &P) -> Result<Self> {
        let data = serde_json::to_value(payload)?;
        Ok(Self::new(P::NAME, data))
    }

    pub fn is_nil(&self) -> bool {
        self.data.is_null()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Ident,
    pub producer: ProducerId,
    pub subject: SubjectId,
    pub version: Version,
    pub schema_version: Version,
    pub snapshot_version: Version,
    pub name: Title,
    pub timestamp: Timestamp,
    pub data: Data,
}

impl Event {
    /// Wire encoding used by streams.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode the payload as `P`, refusing events tagged for another type.
    pub fn decode<P: Payload>(&self) -> Result<P> {
        if self.name != P::NAME {
            return Err(StoreError::PayloadMismatch {
                expected: P::NAME.to_string(),
                actual: self.name.clone(),
            });
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Ident,
    pub producer: ProducerId,
    pub subject: SubjectId,
    pub version: Version,
    pub schema_version: Version,
    pub name: Title,
    pub timestamp: Timestamp,
    pub data: Data,
}

impl Snapshot {
    pub fn decode<P: Payload>(&self) -> Result<P> {
        if self.name != P::NAME {
            return Err(StoreError::PayloadMismatch {
                expected: P::NAME.to_string(),
                actual: self.name.clone(),
            });
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

fn new_ident() -> Ident {
    Uuid::new_v4().to_string()
}

pub fn now() -> Timestamp {
    Utc::now().timestamp()
}

/// Next event version for the subject, 0 when it has none.
async fn next_event_version(
    subject: &str,
    source: &(impl VersionSource + ?Sized),
) -> Result<Version> {
    match source.latest_event(subject).await {
        Ok(latest) => Ok(latest.version + 1),
        Err(StoreError::NoEvents { .. }) => Ok(INITIAL_EVENT_VERSION),
        Err(e) => Err(e),
    }
}

/// Snapshot version currently in force for the subject, 0 when none exists.
async fn current_snapshot_version(
    subject: &str,
    source: &(impl VersionSource + ?Sized),
) -> Result<Version> {
    match source.latest_snapshot(subject).await {
        Ok(latest) => Ok(latest.version),
        Err(StoreError::NoSnapshots { .. }) => Ok(INITIAL_SNAPSHOT_VERSION),
        Err(e) => Err(e),
    }
}

/// Create the next event for `subject`.
///
/// The version continues after whatever `source` reports as the latest event.
pub async fn create_event(
    producer: &str,
    subject: &str,
    schema_version: Version,
    data: EventData,
    source: &(impl VersionSource + ?Sized),
) -> Result<Event> {
    if data.is_nil() {
        return Err(StoreError::NilData);
    }

    let version = next_event_version(subject, source).await?;
    let snapshot_version = current_snapshot_version(subject, source).await?;

    Ok(Event {
        id: new_ident(),
        producer: producer.to_string(),
        subject: subject.to_string(),
        version,
        schema_version,
        snapshot_version,
        name: data.name,
        timestamp: now(),
        data: data.data,
    })
}

/// Create a contiguous run of events for `subject`.
pub async fn create_event_batch(
    producer: &str,
    subject: &str,
    schema_version: Version,
    batch: Vec<EventData>,
    source: &(impl VersionSource + ?Sized),
) -> Result<Vec<Event>> {
    if batch.is_empty() {
        return Err(StoreError::NoEventData);
    }
    if batch.iter().any(EventData::is_nil) {
        return Err(StoreError::NilData);
    }

    let first = next_event_version(subject, source).await?;
    let snapshot_version = current_snapshot_version(subject, source).await?;
    let timestamp = now();

    Ok(batch
        .into_iter()
        .zip(first..)
        .map(|(data, version)| Event {
            id: new_ident(),
            producer: producer.to_string(),
            subject: subject.to_string(),
            version,
            schema_version,
            snapshot_version,
            name: data.name,
            timestamp,
            data: data.data,
        })
        .collect())
}

/// Create the next snapshot for `subject`, starting at 1.
pub async fn create_snapshot(
    producer: &str,
    subject: &str,
    schema_version: Version,
    data: EventData,
    source: &(impl VersionSource + ?Sized),
) -> Result<Snapshot> {
    if data.is_nil() {
        return Err(StoreError::NilData);
    }

    let version = match source.latest_snapshot(subject).await {
        Ok(latest) => latest.version + 1,
        Err(StoreError::NoSnapshots { .. }) => FIRST_SNAPSHOT_VERSION,
        Err(e) => return Err(e),
    };

    Ok(Snapshot {
        id: new_ident(),
        producer: producer.to_string(),
        subject: subject.to_string(),
        version,
        schema_version,
        name: data.name,
        timestamp: now(),
        data: data.data,
    })
}

/// Rebuild an event from stored fields.
#[allow(clippy::too_many_arguments)]
pub fn recreate_event(
    id: Ident,
    producer: ProducerId,
    subject: SubjectId,
    version: Version,
    schema_version: Version,
    snapshot_version: Version,
    name: Title,
    timestamp: Timestamp,
    data: Data,
) -> Event {
    Event {
        id,
        producer,
        subject,
        version,
        schema_version,
        snapshot_version,
        name,
        timestamp,
        data,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn recreate_snapshot(
    id: Ident,
    producer: ProducerId,
    subject: SubjectId,
    version: Version,
    schema_version: Version,
    name: Title,
    timestamp: Timestamp,
    data: Data,
) -> Snapshot {
    Snapshot {
        id,
        producer,
        subject,
        version,
        schema_version,
        name,
        timestamp,
        data,
    }
}
