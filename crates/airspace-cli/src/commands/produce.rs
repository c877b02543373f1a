//! Produce command implementation.

use super::{spawn_signal_handler, Outcome};
use crate::server::{start_server, ServerState};
use airspace_core::kafka::ensure_topic;
use airspace_core::{Config, Monitors, ProducerEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Run the producer until interrupted or a fatal error occurs.
pub async fn run(config: Config) -> Result<Outcome> {
    info!(
        servers = %config.kafka.brokers(),
        topic = %config.kafka.topic,
        poll_interval_secs = config.opensky.poll_interval_secs,
        "Starting producer"
    );

    let monitors = Monitors::new();
    let mut engine = ProducerEngine::connect(&config, monitors.clone())?;

    ensure_topic(&config.kafka)
        .await
        .with_context(|| format!("Failed to ensure topic {}", config.kafka.topic))?;

    let shutdown_tx = engine.shutdown_signal();

    tokio::spawn(start_server(
        Arc::new(ServerState::new(monitors)),
        config.monitoring.producer_port,
        shutdown_tx.subscribe(),
    ));

    let interrupted = spawn_signal_handler(shutdown_tx);

    engine.run().await?;

    info!("Producer stopped");
    Ok(interrupted.outcome())
}
