//! In-process publish/subscribe for domain events.
//!
//! A `Mediator` is constructed once and shared by `Arc` with everything that
//! publishes or listens. Publications are routed by the payload tag: topic
//! listeners see only their tag, universal listeners see everything.
//!
//! Dispatch order for one publication:
//! 1. topic callbacks
//! 2. topic channels
//! 3. universal callbacks
//! 4. universal channels
//!
//! Each step runs in registration order and completes before `publish`
//! returns. A channel send waits until the receiver takes the publication.
//! Connectors whose receiver was dropped are skipped and then removed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, warn};

use crate::event::{EventData, Payload, SubjectId, Title};

/// Result type for mediator operations.
pub type Result<T> = std::result::Result<T, MediatorError>;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A publication in flight and the signal that a receiver took it.
type Handoff = (Arc<Publication>, oneshot::Sender<()>);

const CONNECTOR_CAPACITY: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("Listener on topic {topic} failed: {source}")]
    Listener {
        topic: Title,
        #[source]
        source: ListenerError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publication data cannot be nil")]
    NilData,
}

/// One published payload and the subject it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub subject: SubjectId,
    pub data: EventData,
}

impl Publication {
    pub fn topic(&self) -> &str {
        &self.data.name
    }
}

/// Callback invoked for each matching publication.
pub trait Listener: Send + Sync {
    fn receive(
        &self,
        publication: Arc<Publication>,
    ) -> BoxFuture<'static, std::result::Result<(), ListenerError>>;
}

impl<F, Fut> Listener for F
where
    F: Fn(Arc<Publication>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), ListenerError>> + Send + 'static,
{
    fn receive(
        &self,
        publication: Arc<Publication>,
    ) -> BoxFuture<'static, std::result::Result<(), ListenerError>> {
        Box::pin(self(publication))
    }
}

/// Receiving end of a channel connector.
///
/// The publisher stays blocked until `recv` hands it the publication.
pub struct Connector {
    receiver: mpsc::Receiver<Handoff>,
}

impl Connector {
    pub async fn recv(&mut self) -> Option<Arc<Publication>> {
        let (publication, taken) = self.receiver.recv().await?;
        let _ = taken.send(());
        Some(publication)
    }
}

#[derive(Default)]
pub struct Mediator {
    listeners: RwLock<HashMap<Title, Vec<Arc<dyn Listener>>>>,
    universal_listeners: RwLock<Vec<Arc<dyn Listener>>>,
    connectors: RwLock<HashMap<Title, Vec<mpsc::Sender<Handoff>>>>,
    universal_connectors: RwLock<Vec<mpsc::Sender<Handoff>>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one topic.
    pub async fn listen_to(&self, topic: impl Into<Title>, listener: impl Listener + 'static) {
        let topic = topic.into();
        debug!(topic = %topic, "Registered topic listener");
        self.listeners
            .write()
            .await
            .entry(topic)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Register a callback for every topic.
    pub async fn listen(&self, listener: impl Listener + 'static) {
        debug!("Registered universal listener");
        self.universal_listeners
            .write()
            .await
            .push(Arc::new(listener));
    }

    /// Register a channel for one topic.
    pub async fn channel_to(&self, topic: impl Into<Title>) -> Connector {
        let (sender, receiver) = mpsc::channel(CONNECTOR_CAPACITY);
        self.connectors
            .write()
            .await
            .entry(topic.into())
            .or_default()
            .push(sender);
        Connector { receiver }
    }

    /// Register a channel for every topic.
    pub async fn channel(&self) -> Connector {
        let (sender, receiver) = mpsc::channel(CONNECTOR_CAPACITY);
        self.universal_connectors.write().await.push(sender);
        Connector { receiver }
    }

    /// Publish a typed payload, routed by `P::NAME`.
    pub async fn publish<P: Payload>(&self, subject: &str, payload: &P) -> Result<()> {
        let data = EventData::new(P::NAME, serde_json::to_value(payload)?);
        self.publish_data(subject, data).await
    }

    /// Publish a pre-encoded payload, routed by `data.name`.
    #[tracing::instrument(name = "mediator.publish", skip_all, fields(subject = %subject, topic = %data.name))]
    pub async fn publish_data(&self, subject: &str, data: EventData) -> Result<()> {
        if data.is_nil() {
            return Err(MediatorError::NilData);
        }

        let publication = Arc::new(Publication {
            subject: subject.to_string(),
            data,
        });
        let topic = publication.topic().to_string();

        // Collect under the read locks, release before awaiting listeners
        let topic_listeners = self
            .listeners
            .read()
            .await
            .get(&topic)
            .cloned()
            .unwrap_or_default();
        let topic_connectors = self
            .connectors
            .read()
            .await
            .get(&topic)
            .cloned()
            .unwrap_or_default();
        let universal_listeners = self.universal_listeners.read().await.clone();
        let universal_connectors = self.universal_connectors.read().await.clone();

        Self::notify(&topic, &topic_listeners, &publication).await?;
        if Self::forward(&topic, &topic_connectors, &publication).await {
            self.prune_topic_connectors(&topic).await;
        }
        Self::notify(&topic, &universal_listeners, &publication).await?;
        if Self::forward(&topic, &universal_connectors, &publication).await {
            self.universal_connectors
                .write()
                .await
                .retain(|sender| !sender.is_closed());
        }

        Ok(())
    }

    async fn prune_topic_connectors(&self, topic: &str) {
        let mut connectors = self.connectors.write().await;
        if let Some(senders) = connectors.get_mut(topic) {
            senders.retain(|sender| !sender.is_closed());
            if senders.is_empty() {
                connectors.remove(topic);
            }
        }
    }

    async fn notify(
        topic: &str,
        listeners: &[Arc<dyn Listener>],
        publication: &Arc<Publication>,
    ) -> Result<()> {
        for listener in listeners {
            listener
                .receive(Arc::clone(publication))
                .await
                .map_err(|source| MediatorError::Listener {
                    topic: topic.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Hand the publication to each connector in turn.
    ///
    /// Returns true when some receiver had been dropped.
    async fn forward(
        topic: &str,
        connectors: &[mpsc::Sender<Handoff>],
        publication: &Arc<Publication>,
    ) -> bool {
        let mut dropped = false;
        for connector in connectors {
            let (taken, handed_off) = oneshot::channel();
            let delivered = match connector.send((Arc::clone(publication), taken)).await {
                Ok(()) => handed_off.await.is_ok(),
                Err(_) => false,
            };
            if !delivered {
                warn!(topic = %topic, "Connector receiver dropped, skipping");
                dropped = true;
            }
        }
        dropped
    }

    #[cfg(test)]
    async fn connector_count(&self) -> usize {
        let topic: usize = self.connectors.read().await.values().map(Vec::len).sum();
        topic + self.universal_connectors.read().await.len()
    }
}

#[cfg(test)]
mod tests;
