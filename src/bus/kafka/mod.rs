//! Kafka event stream implementation.
//!
//! All events go to a single configured topic.
//! Message key: event subject (ensures ordering per subject)
//! Payload: the event's JSON encoding

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, error, info, warn};

use super::{subscription, Cancellation, EventStream, Result, StreamError, Subscription};
use crate::config::KafkaConfig;
use crate::event::Event;

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaStreamConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic events are published to.
    pub topic: String,
    /// Consumer group ID (required for subscribing).
    pub group_id: Option<String>,
    /// Producer delivery timeout.
    pub message_timeout: Duration,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl KafkaStreamConfig {
    /// Create config for publishing only.
    pub fn publisher(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: None,
            message_timeout: Duration::from_secs(5),
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Create config that can both publish and subscribe.
    pub fn subscriber(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::publisher(bootstrap_servers, topic)
        }
    }

    /// Build from the `messaging.kafka` config section.
    pub fn from_config(topic: &str, kafka: &KafkaConfig) -> Self {
        Self {
            bootstrap_servers: kafka.bootstrap_servers.clone(),
            topic: topic.to_string(),
            group_id: kafka.group_id.clone(),
            message_timeout: Duration::from_millis(kafka.message_timeout_ms),
            sasl_username: kafka.sasl_username.clone(),
            sasl_password: kafka.sasl_password.clone(),
            sasl_mechanism: kafka.sasl_mechanism.clone(),
            security_protocol: kafka.security_protocol.clone(),
            ssl_ca_location: kafka.ssl_ca_location.clone(),
        }
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Build a ClientConfig for producers.
    pub(crate) fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set(
            "message.timeout.ms",
            self.message_timeout.as_millis().to_string(),
        );
        config.set("acks", "all");
        config.set("enable.idempotence", "true");

        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for consumers.
    pub(crate) fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        if let Some(ref group_id) = self.group_id {
            config.set("group.id", group_id);
        }

        self.apply_security_config(&mut config);
        config
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Kafka event stream implementation.
///
/// Message keys are event subjects, so one subject's events land on one
/// partition in publish order. Each subscription gets its own consumer in
/// the configured group and commits offsets after forwarding.
pub struct KafkaEventStream {
    producer: FutureProducer,
    config: KafkaStreamConfig,
}

impl KafkaEventStream {
    pub fn new(config: KafkaStreamConfig) -> Result<Self> {
        let producer: FutureProducer = config.build_producer_config().create().map_err(|e| {
            StreamError::Connection(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }

    pub fn config(&self) -> &KafkaStreamConfig {
        &self.config
    }
}

/// Decode a Kafka payload into an event.
fn decode_payload(payload: Option<&[u8]>) -> Result<Event> {
    let payload =
        payload.ok_or_else(|| StreamError::Decode("message has no payload".to_string()))?;
    Event::unmarshal(payload).map_err(|e| StreamError::Decode(e.to_string()))
}

#[async_trait]
impl EventStream for KafkaEventStream {
    #[tracing::instrument(name = "stream.publish", skip_all, fields(topic = %self.config.topic, count = events.len()))]
    async fn publish(&self, events: &[Event]) -> Result<()> {
        for event in events {
            let payload = event
                .marshal()
                .map_err(|e| StreamError::Publish(e.to_string()))?;
            let record = FutureRecord::to(&self.config.topic)
                .key(&event.subject)
                .payload(&payload);

            self.producer
                .send(record, self.config.message_timeout)
                .await
                .map_err(|(e, _)| StreamError::Publish(format!("Failed to publish: {}", e)))?;

            debug!(
                subject = %event.subject,
                version = event.version,
                "Published event to Kafka"
            );
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, mut cancel: Cancellation) -> Result<Subscription> {
        if self.config.group_id.is_none() {
            return Err(StreamError::Subscribe(
                "Cannot subscribe: no consumer group configured. Use KafkaStreamConfig::subscriber()"
                    .to_string(),
            ));
        }

        let consumer: StreamConsumer =
            self.config.build_consumer_config().create().map_err(|e| {
                StreamError::Connection(format!("Failed to create Kafka consumer: {}", e))
            })?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| StreamError::Subscribe(format!("Failed to subscribe to topic: {}", e)))?;

        info!(topic = %topic, group_id = ?self.config.group_id, "Subscribed to Kafka topic");

        let (sink, subscription) = subscription();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(topic = %topic, "Kafka subscription cancelled");
                        break;
                    }
                    received = consumer.recv() => match received {
                        Ok(message) => {
                            match decode_payload(message.payload()) {
                                Ok(event) => {
                                    debug!(
                                        topic = %message.topic(),
                                        partition = message.partition(),
                                        offset = message.offset(),
                                        "Received event"
                                    );
                                    if sink.events.send(event).await.is_err() {
                                        debug!(topic = %topic, "Subscriber dropped, stopping reader");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!(topic = %topic, error = %e, "Failed to decode Kafka message");
                                    sink.report(e).await;
                                }
                            }

                            // Malformed messages are committed too so they are not redelivered
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                error!(error = %e, "Failed to commit offset");
                                sink.report(StreamError::Transport(e.to_string())).await;
                            }
                        }
                        Err(e) => {
                            error!(topic = %topic, error = %e, "Kafka consumer error");
                            sink.report(StreamError::Transport(e.to_string())).await;
                        }
                    },
                }
            }
        });

        Ok(subscription)
    }
}
