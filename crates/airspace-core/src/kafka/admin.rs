//! Topic provisioning.

use super::consumer::apply_security;
use crate::config::KafkaConfig;
use crate::{Error, KafkaError, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::info;

/// What `ensure_topic` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStatus {
    Created,
    AlreadyExists,
}

/// Create the state-vector topic if it does not exist yet.
pub async fn ensure_topic(config: &KafkaConfig) -> Result<TopicStatus> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.brokers())
        .set("broker.address.family", "v4");
    apply_security(&mut client_config, config);

    let admin: AdminClient<DefaultClientContext> = client_config.create().map_err(|e| {
        Error::Kafka(KafkaError::ConnectionFailed {
            broker: config.brokers(),
            message: e.to_string(),
        })
    })?;

    let settings = &config.topic_settings;
    let retention = settings.retention_ms.to_string();
    let topic = NewTopic::new(
        &config.topic,
        settings.num_partitions,
        TopicReplication::Fixed(settings.replication_factor),
    )
    .set("retention.ms", &retention);

    let options = AdminOptions::new().operation_timeout(Some(Duration::from_secs(30)));

    let results = admin
        .create_topics([&topic], &options)
        .await
        .map_err(|e| Error::Kafka(KafkaError::TopicAdmin(e.to_string())))?;

    let mut status = TopicStatus::Created;
    for result in results {
        match result {
            Ok(name) => {
                info!(
                    topic = %name,
                    partitions = settings.num_partitions,
                    replication = settings.replication_factor,
                    retention_ms = settings.retention_ms,
                    "Topic created"
                );
            }
            Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                info!(topic = %name, "Topic already exists");
                status = TopicStatus::AlreadyExists;
            }
            Err((name, code)) => {
                return Err(Error::Kafka(KafkaError::TopicAdmin(format!(
                    "{}: {}",
                    name, code
                ))));
            }
        }
    }

    Ok(status)
}
