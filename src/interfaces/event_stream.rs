//! Event stream interface for broker fan-out.

use async_trait::async_trait;

use crate::bus::{Cancellation, Subscription};
use crate::event::Event;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur during stream operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Subscriber lagged, skipped {0} messages")]
    Lagged(u64),
}

/// Interface for broadcasting shipped events to other services.
///
/// Delivery is at-least-once and ordered per subject. Consumers must
/// tolerate duplicates.
///
/// Implementations:
/// - `KafkaEventStream`: Kafka topic keyed by subject
/// - `ChannelEventStream`: in-process broadcast channels
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Publish events in order to the configured topic.
    ///
    /// The first failure aborts the rest of the batch and is returned.
    async fn publish(&self, events: &[Event]) -> Result<()>;

    /// Start a background reader on `topic`.
    ///
    /// Decoded events arrive on `Subscription::events`; decode and transport
    /// failures arrive on `Subscription::errors` without stopping the reader.
    /// The reader stops once `cancel` fires.
    async fn subscribe(&self, topic: &str, cancel: Cancellation) -> Result<Subscription>;
}
