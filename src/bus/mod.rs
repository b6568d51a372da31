//! Event stream implementations.
//!
//! Shipped events are broadcast to other services through an
//! [`EventStream`]:
//! - `ChannelEventStream`: in-process broadcast channels
//! - `KafkaEventStream`: Kafka topic keyed by subject (feature `kafka`)
//!
//! Subscriptions run a background reader that stops when its
//! [`Cancellation`] fires.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::{MessagingConfig, MessagingType};
use crate::event::Event;

pub mod channel;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use crate::interfaces::event_stream::{EventStream, Result, StreamError};
pub use channel::ChannelEventStream;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventStream, KafkaStreamConfig};

/// Buffer between a subscription's reader task and the caller.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 64;

/// Receiving ends of a subscription.
///
/// Drain both: the reader waits when either buffer is full.
#[derive(Debug)]
pub struct Subscription {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<StreamError>,
}

/// Sending ends held by a reader task.
pub(crate) struct SubscriptionSink {
    pub events: mpsc::Sender<Event>,
    pub errors: mpsc::Sender<StreamError>,
}

impl SubscriptionSink {
    /// Report a non-fatal error. Dropped silently if nobody is listening.
    pub async fn report(&self, error: StreamError) {
        let _ = self.errors.send(error).await;
    }
}

/// Create a linked sink and subscription.
pub(crate) fn subscription() -> (SubscriptionSink, Subscription) {
    let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let (errors_tx, errors_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    (
        SubscriptionSink {
            events: events_tx,
            errors: errors_tx,
        },
        Subscription {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

/// Handle that stops every reader holding the paired [`Cancellation`].
///
/// Dropping the handle also cancels.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Cancellation signal observed by reader loops.
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once cancelled or once the handle is dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|cancelled| *cancelled).await;
    }
}

pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, Cancellation { receiver })
}

/// Initialize the event stream based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: always available
/// - Kafka: `--features kafka`
pub async fn init_stream(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn EventStream>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let stream = ChannelEventStream::new(&config.topic, config.channel.capacity);
            info!(messaging_type = "channel", topic = %config.topic, "Event stream initialized");
            Ok(Arc::new(stream))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka_config = KafkaStreamConfig::from_config(&config.topic, &config.kafka);
                let stream = KafkaEventStream::new(kafka_config)?;
                info!(messaging_type = "kafka", topic = %config.topic, "Event stream initialized");
                Ok(Arc::new(stream))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
