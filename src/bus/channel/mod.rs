//! In-memory channel-based event stream.
//!
//! Uses one tokio broadcast channel per topic for fan-out within a single
//! process. Events cross the channel as JSON bytes, so subscribers decode
//! them exactly as they would from a broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::{subscription, Cancellation, EventStream, Result, StreamError, Subscription};
use crate::event::Event;

/// Default broadcast buffer per topic.
pub const CHANNEL_CAPACITY: usize = 1024;

type Sender = broadcast::Sender<Arc<Vec<u8>>>;

/// In-memory event stream using tokio broadcast channels.
///
/// `publish` writes to the configured topic; `subscribe` can listen on any
/// topic. Publishing with no subscribers is not an error.
pub struct ChannelEventStream {
    topic: String,
    capacity: usize,
    topics: RwLock<HashMap<String, Sender>>,
}

impl ChannelEventStream {
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let topic = topic.into();
        info!(topic = %topic, capacity, "Channel event stream initialized");
        Self {
            topic,
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn sender(&self, topic: &str) -> Sender {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.clone();
        }
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Put raw bytes on a topic without encoding.
    pub async fn publish_bytes(&self, topic: &str, payload: Vec<u8>) {
        let sender = self.sender(topic).await;
        match sender.send(Arc::new(payload)) {
            Ok(receivers) => debug!(topic = %topic, receivers, "Published to channel"),
            Err(_) => debug!(topic = %topic, "No subscribers for channel"),
        }
    }
}

#[async_trait]
impl EventStream for ChannelEventStream {
    #[tracing::instrument(name = "stream.publish", skip_all, fields(topic = %self.topic, count = events.len()))]
    async fn publish(&self, events: &[Event]) -> Result<()> {
        for event in events {
            let payload = event
                .marshal()
                .map_err(|e| StreamError::Publish(e.to_string()))?;
            self.publish_bytes(&self.topic, payload).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, mut cancel: Cancellation) -> Result<Subscription> {
        let mut receiver = self.sender(topic).await.subscribe();
        let (sink, subscription) = subscription();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(topic = %topic, "Channel subscription cancelled");
                        break;
                    }
                    received = receiver.recv() => match received {
                        Ok(payload) => match Event::unmarshal(&payload) {
                            Ok(event) => {
                                if sink.events.send(event).await.is_err() {
                                    debug!(topic = %topic, "Subscriber dropped, stopping reader");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(topic = %topic, error = %e, "Failed to decode channel message");
                                sink.report(StreamError::Decode(e.to_string())).await;
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Channel subscriber lagged");
                            sink.report(StreamError::Lagged(skipped)).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!(topic = %topic, "Channel closed, stopping reader");
                            break;
                        }
                    },
                }
            }
        });

        Ok(subscription)
    }
}
