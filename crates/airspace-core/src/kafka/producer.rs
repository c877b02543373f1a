//! Kafka producer for state vectors.

use super::consumer::apply_security;
use super::EventPublisher;
use crate::config::KafkaConfig;
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publishes keyed JSON payloads and confirms them on flush.
pub struct KafkaEventPublisher {
    producer: Arc<FutureProducer>,
    topic: String,
    flush_timeout: Duration,
    pending: Mutex<Vec<(String, DeliveryFuture)>>,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = Self::client_config(config).create().map_err(|e| {
            Error::Kafka(KafkaError::ConnectionFailed {
                broker: config.brokers(),
                message: e.to_string(),
            })
        })?;

        info!(
            topic = %config.topic,
            servers = %config.brokers(),
            linger_ms = config.producer.linger_ms,
            "Kafka producer created"
        );

        Ok(Self {
            producer: Arc::new(producer),
            topic: config.topic.clone(),
            flush_timeout: Duration::from_millis(config.producer.flush_timeout_ms),
            pending: Mutex::new(Vec::new()),
        })
    }

    fn client_config(config: &KafkaConfig) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers())
            .set("linger.ms", config.producer.linger_ms.to_string())
            .set("batch.size", config.producer.batch_size.to_string())
            .set("acks", &config.producer.acks)
            .set(
                "message.timeout.ms",
                config.producer.message_timeout_ms.to_string(),
            )
            .set("broker.address.family", "v4");

        apply_security(&mut client_config, config);
        client_config
    }

}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(&payload);

        let delivery = self.producer.send_result(record).map_err(|(e, _)| {
            Error::Kafka(KafkaError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
        })?;

        self.pending.lock().push((key.to_string(), delivery));
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let producer = Arc::clone(&self.producer);
        let timeout = self.flush_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| Error::Kafka(KafkaError::Flush(e.to_string())))?;

        let pending = std::mem::take(&mut *self.pending.lock());
        let total = pending.len();

        if let Err(e) = flushed {
            warn!(in_flight = total, error = %e, "Producer flush did not complete");
        }

        let (keys, deliveries): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let results = join_all(deliveries).await;

        let mut delivered = 0;
        let mut first_failure: Option<String> = None;

        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(Ok((partition, offset))) => {
                    delivered += 1;
                    debug!(key = %key, partition, offset, "Delivered");
                }
                Ok(Err((e, _))) => {
                    warn!(key = %key, error = %e, "Delivery failed");
                    first_failure.get_or_insert_with(|| format!("{}: {}", key, e));
                }
                Err(_) => {
                    warn!(key = %key, "Delivery canceled");
                    first_failure.get_or_insert_with(|| format!("{}: canceled", key));
                }
            }
        }

        match first_failure {
            None => Ok(delivered),
            Some(message) => Err(Error::Kafka(KafkaError::Flush(format!(
                "{} of {} records not acknowledged, first: {}",
                total - delivered,
                total,
                message
            )))),
        }
    }
}
