//! Unit of work: stage mediator traffic, then ship and broadcast on commit.
//!
//! Domain code publishes payloads on the [`Mediator`]. Every publication is
//! loaded into the store's stage under the unit's producer id. `commit`
//! ships the stage and, when a stream is attached, forwards the shipped
//! events to it.
//!
//! The durable write and the broadcast are not linked: if publishing fails
//! after a successful ship, the events stay stored and the error is
//! returned as [`UnitOfWorkError::Stream`]. Events from subjects committed
//! before a failing subject are broadcast too.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::event::{Event, ProducerId};
use crate::interfaces::event_store::{EventStore, StoreError};
use crate::interfaces::event_stream::{EventStream, StreamError};
use crate::mediator::{ListenerError, Mediator, Publication};

/// Result type for unit of work operations.
pub type Result<T> = std::result::Result<T, UnitOfWorkError>;

#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("Nothing staged to commit")]
    EmptyCommit,

    #[error("Store failed shipping the events: {0}")]
    Store(#[from] StoreError),

    #[error("Events shipped but not broadcast: {0}")]
    Stream(#[from] StreamError),
}

pub struct UnitOfWork {
    store: Arc<dyn EventStore>,
    stream: Option<Arc<dyn EventStream>>,
    mediator: Arc<Mediator>,
    producer: ProducerId,
}

impl UnitOfWork {
    /// Create a unit of work and register its universal listener.
    pub async fn new(
        store: Arc<dyn EventStore>,
        stream: Option<Arc<dyn EventStream>>,
        mediator: Arc<Mediator>,
        producer: impl Into<ProducerId>,
    ) -> Self {
        let producer = producer.into();

        let listener_store = Arc::clone(&store);
        let listener_producer = producer.clone();
        mediator
            .listen(move |publication: Arc<Publication>| {
                let store = Arc::clone(&listener_store);
                let producer = listener_producer.clone();
                async move {
                    let event = store
                        .load(&producer, &publication.subject, publication.data.clone())
                        .await?;
                    debug!(
                        subject = %event.subject,
                        version = event.version,
                        "Staged mediator publication"
                    );
                    Ok::<(), ListenerError>(())
                }
            })
            .await;

        info!(producer = %producer, streaming = stream.is_some(), "Unit of work ready");

        Self {
            store,
            stream,
            mediator,
            producer,
        }
    }

    pub fn mediator(&self) -> &Arc<Mediator> {
        &self.mediator
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn stream(&self) -> Option<&Arc<dyn EventStream>> {
        self.stream.as_ref()
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Ship everything staged, then broadcast the shipped events.
    ///
    /// A ship that fails after committing earlier subjects still broadcasts
    /// those subjects before the store error is returned.
    #[tracing::instrument(name = "uow.commit", skip_all, fields(producer = %self.producer))]
    pub async fn commit(&self) -> Result<Vec<Event>> {
        if self.store.is_stage_empty().await {
            return Err(UnitOfWorkError::EmptyCommit);
        }

        let shipped = match self.store.ship().await {
            Ok(shipped) => shipped,
            Err(e) => {
                if !e.shipped().is_empty() {
                    // Broadcast failure is logged; the store error wins
                    let _ = self.broadcast(e.shipped()).await;
                }
                return Err(e.into());
            }
        };

        self.broadcast(&shipped).await?;

        info!(count = shipped.len(), "Unit of work committed");
        Ok(shipped)
    }

    async fn broadcast(&self, events: &[Event]) -> std::result::Result<(), StreamError> {
        let Some(stream) = &self.stream else {
            return Ok(());
        };
        if events.is_empty() {
            return Ok(());
        }
        stream.publish(events).await.map_err(|e| {
            warn!(
                count = events.len(),
                error = %e,
                "Events shipped but stream publish failed"
            );
            e
        })
    }

    /// Discard everything staged.
    pub async fn clear(&self) {
        self.store.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{cancellation, ChannelEventStream};
    use crate::storage::{MemoryWarehouse, StagedEventStore};
    use crate::test_utils::{AccountOpened, Deposited};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingStream;

    #[async_trait]
    impl EventStream for FailingStream {
        async fn publish(&self, _events: &[Event]) -> crate::bus::Result<()> {
            Err(StreamError::Publish("broker down".to_string()))
        }

        async fn subscribe(
            &self,
            _topic: &str,
            _cancel: crate::bus::Cancellation,
        ) -> crate::bus::Result<crate::bus::Subscription> {
            Err(StreamError::Subscribe("broker down".to_string()))
        }
    }

    fn memory_store() -> Arc<dyn EventStore> {
        Arc::new(StagedEventStore::new(MemoryWarehouse::new()))
    }

    #[tokio::test]
    async fn test_commit_without_publications_is_empty() {
        let uow = UnitOfWork::new(memory_store(), None, Arc::new(Mediator::new()), "svc").await;

        let err = uow.commit().await.unwrap_err();

        assert!(matches!(err, UnitOfWorkError::EmptyCommit));
    }

    #[tokio::test]
    async fn test_publications_are_staged_under_producer() {
        let uow = UnitOfWork::new(memory_store(), None, Arc::new(Mediator::new()), "svc").await;

        uow.mediator()
            .publish("acct-1", &AccountOpened::new("erin"))
            .await
            .unwrap();
        uow.mediator()
            .publish("acct-1", &Deposited { amount: 5 })
            .await
            .unwrap();

        let staged = uow.store().staged_events().await;
        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|e| e.producer == "svc"));
        assert_eq!(staged[1].version, 1);
    }

    #[tokio::test]
    async fn test_commit_ships_and_broadcasts() {
        let stream = Arc::new(ChannelEventStream::new("events", 16));
        let (_handle, cancel) = cancellation();
        let mut subscription = stream.subscribe("events", cancel).await.unwrap();
        let uow = UnitOfWork::new(
            memory_store(),
            Some(stream),
            Arc::new(Mediator::new()),
            "svc",
        )
        .await;

        uow.mediator()
            .publish("acct-1", &Deposited { amount: 5 })
            .await
            .unwrap();
        let shipped = uow.commit().await.unwrap();

        assert_eq!(shipped.len(), 1);
        assert!(uow.store().is_stage_empty().await);
        let received = tokio::time::timeout(Duration::from_secs(1), subscription.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, shipped[0]);
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_durable_write() {
        let uow = UnitOfWork::new(
            memory_store(),
            Some(Arc::new(FailingStream)),
            Arc::new(Mediator::new()),
            "svc",
        )
        .await;
        uow.mediator()
            .publish("acct-1", &Deposited { amount: 5 })
            .await
            .unwrap();

        let err = uow.commit().await.unwrap_err();

        assert!(matches!(err, UnitOfWorkError::Stream(_)));
        assert_eq!(uow.store().concerning("acct-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_discards_staged_work() {
        let uow = UnitOfWork::new(memory_store(), None, Arc::new(Mediator::new()), "svc").await;
        uow.mediator()
            .publish("acct-1", &Deposited { amount: 5 })
            .await
            .unwrap();

        uow.clear().await;

        assert!(matches!(
            uow.commit().await,
            Err(UnitOfWorkError::EmptyCommit)
        ));
        assert!(uow.store().concerning("acct-1").await.unwrap().is_empty());
    }
}
