//! Event store that stages writes in memory and ships them through a warehouse.
//!
//! `load` and `snapshot` only touch the stage. `ship` writes every staged
//! subject in turn:
//!
//! 1. Conflict check: the first staged event must continue the stored tail.
//! 2. Insert each group's events, then the snapshot that closes it, recording
//!    every document id in the insertion history.
//! 3. On failure, delete everything the history recorded for that subject and
//!    stop. Subjects shipped earlier in the same call stay committed and are
//!    handed back inside `StoreError::PartialShip`.
//!
//! The stage sits behind an async mutex held for the whole of each
//! `load`/`snapshot`/`ship`/`clear`, so concurrent callers are serialized.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{InsertionHistory, Warehouse};
use crate::event::{
    create_event, create_event_batch, create_snapshot, Event, EventData, Snapshot, Timestamp,
    Version, INITIAL_SCHEMA_VERSION,
};
use crate::interfaces::event_store::{EventStore, Result, StoreError, VersionSource};
use crate::retrieve::{EventQuery, RetrieveOptions};
use crate::stage::{EventStage, Stage};

/// Staged event store over a document warehouse.
pub struct StagedEventStore<W: Warehouse> {
    warehouse: W,
    stage: Mutex<Stage>,
    schema_version: Version,
}

impl<W: Warehouse> StagedEventStore<W> {
    pub fn new(warehouse: W) -> Self {
        Self {
            warehouse,
            stage: Mutex::new(Stage::new()),
            schema_version: INITIAL_SCHEMA_VERSION,
        }
    }

    /// Schema version stamped on every created event and snapshot.
    pub fn with_schema_version(mut self, schema_version: Version) -> Self {
        self.schema_version = schema_version;
        self
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Groups currently staged for the subject.
    pub async fn event_stages(&self, subject: &str) -> Vec<EventStage> {
        self.stage.lock().await.event_stages(subject).to_vec()
    }

    async fn check_tail(
        &self,
        session: &mut W::Session,
        subject: &str,
        first_staged: Version,
    ) -> Result<()> {
        match self.warehouse.tail_version(session, subject).await? {
            Some(tail) if tail + 1 != first_staged => Err(StoreError::StageOutOfSync {
                subject: subject.to_string(),
                expected: tail + 1,
                actual: first_staged,
            }),
            _ => Ok(()),
        }
    }

    /// Conflict-check and insert one subject's groups.
    async fn write_subject(
        &self,
        session: &mut W::Session,
        history: &mut InsertionHistory<W::DocumentId>,
        subject: &str,
        groups: &[EventStage],
    ) -> Result<Vec<Event>> {
        if let Some(first) = groups.iter().find_map(|group| group.events().first()) {
            self.check_tail(session, subject, first.version).await?;
        }

        let mut written = Vec::new();
        for group in groups {
            for event in group.events() {
                let id = self.warehouse.insert_event(session, event).await?;
                history.record(self.warehouse.events_collection(), id);
                written.push(event.clone());
            }
            if let Some(snapshot) = group.snapshot() {
                let id = self.warehouse.insert_snapshot(session, snapshot).await?;
                history.record(self.warehouse.snapshots_collection(), id);
            }
        }
        Ok(written)
    }

    /// Delete everything recorded in `history` and wrap `cause`.
    async fn rollback(
        &self,
        session: &mut W::Session,
        history: &InsertionHistory<W::DocumentId>,
        subject: &str,
        cause: StoreError,
    ) -> StoreError {
        warn!(
            subject = %subject,
            documents = history.len(),
            error = %cause,
            "Ship failed, rolling back inserted documents"
        );

        for (collection, ids) in history.collections() {
            if let Err(rollback) = self.warehouse.delete_documents(session, collection, ids).await
            {
                error!(
                    subject = %subject,
                    collection = %collection,
                    error = %rollback,
                    "Rollback failed, documents from the failed ship may remain"
                );
                return StoreError::RollbackFailed {
                    subject: subject.to_string(),
                    source: Box::new(cause),
                    rollback: Box::new(rollback),
                };
            }
        }

        StoreError::RolledBack {
            subject: subject.to_string(),
            source: Box::new(cause),
        }
    }

    /// Write groups for a subject in one session, rolling back on failure.
    async fn write_with_rollback(
        &self,
        subject: &str,
        groups: &[EventStage],
    ) -> Result<Vec<Event>> {
        let mut session = self.warehouse.start_session().await?;
        let mut history = InsertionHistory::new();

        let result = self
            .write_subject(&mut session, &mut history, subject, groups)
            .await;
        let outcome = match result {
            Ok(events) => Ok(events),
            Err(cause) => Err(self.rollback(&mut session, &history, subject, cause).await),
        };
        history.clear();
        outcome
    }

    async fn find(&self, query: EventQuery) -> Result<Vec<Event>> {
        self.warehouse.find_events(&query).await
    }
}

/// Latest-version lookup that prefers the stage over the warehouse.
struct StagedView<'a, W> {
    stage: &'a Stage,
    warehouse: &'a W,
}

#[async_trait]
impl<'a, W: Warehouse> VersionSource for StagedView<'a, W> {
    async fn latest_event(&self, subject: &str) -> Result<Event> {
        if let Some(event) = self.stage.latest_event(subject) {
            return Ok(event.clone());
        }
        self.warehouse
            .latest_event(subject)
            .await?
            .ok_or_else(|| StoreError::NoEvents {
                subject: subject.to_string(),
            })
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Snapshot> {
        if let Some(snapshot) = self.stage.latest_snapshot(subject) {
            return Ok(snapshot.clone());
        }
        self.warehouse
            .latest_snapshot(subject)
            .await?
            .ok_or_else(|| StoreError::NoSnapshots {
                subject: subject.to_string(),
            })
    }
}

/// Latest-version lookup against the warehouse only.
struct RemoteView<'a, W>(&'a W);

#[async_trait]
impl<'a, W: Warehouse> VersionSource for RemoteView<'a, W> {
    async fn latest_event(&self, subject: &str) -> Result<Event> {
        self.0
            .latest_event(subject)
            .await?
            .ok_or_else(|| StoreError::NoEvents {
                subject: subject.to_string(),
            })
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Snapshot> {
        self.0
            .latest_snapshot(subject)
            .await?
            .ok_or_else(|| StoreError::NoSnapshots {
                subject: subject.to_string(),
            })
    }
}

#[async_trait]
impl<W: Warehouse> VersionSource for StagedEventStore<W> {
    async fn latest_event(&self, subject: &str) -> Result<Event> {
        let stage = self.stage.lock().await;
        StagedView {
            stage: &stage,
            warehouse: &self.warehouse,
        }
        .latest_event(subject)
        .await
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Snapshot> {
        let stage = self.stage.lock().await;
        StagedView {
            stage: &stage,
            warehouse: &self.warehouse,
        }
        .latest_snapshot(subject)
        .await
    }
}

#[async_trait]
impl<W: Warehouse> EventStore for StagedEventStore<W> {
    #[tracing::instrument(name = "store.send", skip_all, fields(subject = %subject, count = data.len()))]
    async fn send(
        &self,
        producer: &str,
        subject: &str,
        data: Vec<EventData>,
    ) -> Result<Vec<Event>> {
        let events = create_event_batch(
            producer,
            subject,
            self.schema_version,
            data,
            &RemoteView(&self.warehouse),
        )
        .await?;

        let sent = self
            .write_with_rollback(subject, &[EventStage::from_events(events)])
            .await?;
        debug!(subject = %subject, count = sent.len(), "Sent events");
        Ok(sent)
    }

    async fn load(&self, producer: &str, subject: &str, data: EventData) -> Result<Event> {
        let mut stage = self.stage.lock().await;
        let event = create_event(
            producer,
            subject,
            self.schema_version,
            data,
            &StagedView {
                stage: &stage,
                warehouse: &self.warehouse,
            },
        )
        .await?;

        debug!(
            subject = %subject,
            version = event.version,
            name = %event.name,
            "Staged event"
        );
        stage.add_event(event.clone());
        Ok(event)
    }

    async fn snapshot(&self, producer: &str, subject: &str, data: EventData) -> Result<Snapshot> {
        let mut stage = self.stage.lock().await;
        let snapshot = create_snapshot(
            producer,
            subject,
            self.schema_version,
            data,
            &StagedView {
                stage: &stage,
                warehouse: &self.warehouse,
            },
        )
        .await?;

        debug!(
            subject = %subject,
            version = snapshot.version,
            "Staged snapshot"
        );
        stage.add_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    #[tracing::instrument(name = "store.ship", skip_all)]
    async fn ship(&self) -> Result<Vec<Event>> {
        let mut stage = self.stage.lock().await;
        if stage.is_all_empty() {
            debug!("Stage is empty, nothing to ship");
            return Ok(Vec::new());
        }

        let mut session = self.warehouse.start_session().await?;
        let mut history = InsertionHistory::new();
        let mut shipped = Vec::new();

        for subject in stage.subjects() {
            if stage.is_empty(&subject) {
                continue;
            }
            let groups = stage.event_stages(&subject).to_vec();

            match self
                .write_subject(&mut session, &mut history, &subject, &groups)
                .await
            {
                Ok(events) => {
                    debug!(subject = %subject, count = events.len(), "Shipped subject");
                    history.clear();
                    stage.clear(&subject);
                    shipped.extend(events);
                }
                Err(cause) => {
                    let err = self.rollback(&mut session, &history, &subject, cause).await;
                    history.clear();
                    stage.clear(&subject);
                    if shipped.is_empty() {
                        return Err(err);
                    }
                    warn!(
                        subject = %subject,
                        shipped = shipped.len(),
                        "Ship stopped after earlier subjects were committed"
                    );
                    return Err(StoreError::PartialShip {
                        shipped,
                        source: Box::new(err),
                    });
                }
            }
        }

        history.clear();
        info!(count = shipped.len(), "Ship completed");
        Ok(shipped)
    }

    async fn clear(&self) {
        let mut stage = self.stage.lock().await;
        debug!(subjects = stage.subjects().len(), "Clearing stage");
        stage.clear_all();
    }

    async fn staged_events(&self) -> Vec<Event> {
        self.stage.lock().await.events()
    }

    async fn is_stage_empty(&self) -> bool {
        self.stage.lock().await.is_all_empty()
    }

    async fn concerning(&self, subject: &str) -> Result<Vec<Event>> {
        self.find(EventQuery::subject(subject)).await
    }

    async fn by(&self, producer: &str) -> Result<Vec<Event>> {
        self.find(EventQuery::producer(producer)).await
    }

    async fn between(&self, subject: &str, from: Version, to: Version) -> Result<Vec<Event>> {
        let options = RetrieveOptions::versions(from, to)?;
        self.find(EventQuery::subject(subject).with_options(options))
            .await
    }

    async fn with(&self, subject: &str, snapshot_version: Version) -> Result<Vec<Event>> {
        self.find(EventQuery::subject(subject).with_snapshot_version(snapshot_version))
            .await
    }

    async fn before(&self, subject: &str, point_in_time: Timestamp) -> Result<Vec<Event>> {
        let options = RetrieveOptions::before(point_in_time);
        self.find(EventQuery::subject(subject).with_options(options))
            .await
    }

    async fn after(&self, subject: &str, point_in_time: Timestamp) -> Result<Vec<Event>> {
        let options = RetrieveOptions::after(point_in_time);
        self.find(EventQuery::subject(subject).with_options(options))
            .await
    }

    async fn temporal(
        &self,
        subject: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Event>> {
        let options = RetrieveOptions::timestamps(from, to)?;
        self.find(EventQuery::subject(subject).with_options(options))
            .await
    }

    async fn retrieve(&self, subject: &str, options: RetrieveOptions) -> Result<Vec<Event>> {
        self.find(EventQuery::subject(subject).with_options(options))
            .await
    }

    async fn snapshots(&self, subject: &str) -> Result<Vec<Snapshot>> {
        self.warehouse.find_snapshots(subject).await
    }
}
