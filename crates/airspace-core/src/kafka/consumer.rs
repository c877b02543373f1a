//! Kafka consumer with manual commits and pause/resume backpressure.
//!
//! Uses the CooperativeSticky assignor for minimal rebalance disruption.
//! Auto-commit is disabled: offsets are committed only after the batch they
//! cover has been written to the store.

use super::{EventSource, KafkaMessage, PollResult};
use crate::config::KafkaConfig;
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builder for creating a Kafka consumer.
pub struct KafkaConsumerBuilder {
    config: KafkaConfig,
}

impl KafkaConsumerBuilder {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", self.config.brokers())
            .set("group.id", &self.config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", self.config.auto_offset_reset.as_str())
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                self.config.heartbeat_interval_ms.to_string(),
            )
            // Must exceed the longest store write, otherwise the group evicts us mid-flush.
            .set(
                "max.poll.interval.ms",
                self.config.max_poll_interval_ms.to_string(),
            )
            .set("partition.assignment.strategy", "cooperative-sticky");

        apply_security(&mut client_config, &self.config);
        client_config
    }

    /// Create the consumer and subscribe to the topic.
    pub fn build(self) -> Result<KafkaEventConsumer> {
        let consumer: StreamConsumer = self.client_config().create().map_err(|e| {
            Error::Kafka(KafkaError::ConnectionFailed {
                broker: self.config.brokers(),
                message: e.to_string(),
            })
        })?;

        consumer
            .subscribe(&[&self.config.topic])
            .map_err(|e| Error::Kafka(KafkaError::ConsumerGroup(e.to_string())))?;

        info!(
            topic = %self.config.topic,
            group = %self.config.consumer_group,
            servers = %self.config.brokers(),
            "Kafka consumer subscribed"
        );

        Ok(KafkaEventConsumer {
            consumer: Arc::new(consumer),
            topic: self.config.topic,
            paused: false,
        })
    }
}

/// Apply the optional security section to a client configuration.
pub(crate) fn apply_security(client_config: &mut ClientConfig, config: &KafkaConfig) {
    if let Some(ref protocol) = config.security.protocol {
        client_config.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = config.security.sasl_mechanism {
        client_config.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = config.security.sasl_username {
        client_config.set("sasl.username", username);
    }
    if let Some(ref password) = config.security.sasl_password {
        client_config.set("sasl.password", password);
    }
    if let Some(ref path) = config.security.ssl_ca_location {
        client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
    }
}

/// Subscribed Kafka consumer.
pub struct KafkaEventConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
    paused: bool,
}

impl KafkaEventConsumer {
    fn convert_message(msg: &BorrowedMessage) -> KafkaMessage {
        KafkaMessage {
            key: msg.key().map(|k| k.to_vec()),
            value: msg.payload().map(|v| v.to_vec()),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            timestamp: msg.timestamp().to_millis().unwrap_or(0),
        }
    }
}

#[async_trait]
impl EventSource for KafkaEventConsumer {
    async fn poll(&mut self, timeout: Duration) -> PollResult {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => PollResult::Message(Self::convert_message(&msg)),
            Ok(Err(e)) => PollResult::Error(Error::Kafka(KafkaError::ConsumerGroup(e.to_string()))),
            Err(_) => PollResult::Timeout,
        }
    }

    async fn commit(&mut self, offsets: &[(String, i32, i64)]) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (topic, partition, offset) in offsets {
            // Committed offset is the next offset to read.
            tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))
                .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?;
        }

        // A synchronous commit blocks on the broker round trip.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?;

        debug!(offsets = ?offsets, "Offsets committed");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }

        let assignment = self
            .consumer
            .assignment()
            .map_err(|e| Error::Kafka(KafkaError::PartitionAssignment(e.to_string())))?;

        if assignment.count() > 0 {
            self.consumer
                .pause(&assignment)
                .map_err(|e| Error::Kafka(KafkaError::PartitionAssignment(e.to_string())))?;
        }

        self.paused = true;
        warn!("Kafka consumer PAUSED due to backpressure");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if !self.paused {
            return Ok(());
        }

        let assignment = self
            .consumer
            .assignment()
            .map_err(|e| Error::Kafka(KafkaError::PartitionAssignment(e.to_string())))?;

        if assignment.count() > 0 {
            self.consumer
                .resume(&assignment)
                .map_err(|e| Error::Kafka(KafkaError::PartitionAssignment(e.to_string())))?;
        }

        self.paused = false;
        info!("Kafka consumer RESUMED");
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer unsubscribed");
        Ok(())
    }
}
