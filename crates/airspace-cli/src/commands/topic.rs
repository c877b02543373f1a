//! Topic command implementation.

use airspace_core::kafka::{ensure_topic, TopicStatus};
use airspace_core::Config;
use anyhow::Result;

/// Create the state-vector topic if needed.
pub async fn init(config: Config) -> Result<()> {
    config.validate()?;

    let status = ensure_topic(&config.kafka).await?;
    let settings = &config.kafka.topic_settings;
    match status {
        TopicStatus::Created => println!(
            "Created topic {} ({} partitions, replication factor {})",
            config.kafka.topic, settings.num_partitions, settings.replication_factor
        ),
        TopicStatus::AlreadyExists => {
            println!("Topic {} already exists", config.kafka.topic)
        }
    }
    Ok(())
}
