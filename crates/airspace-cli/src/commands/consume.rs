//! Consume command implementation.

use super::{spawn_signal_handler, Outcome};
use crate::server::{start_server, ServerState};
use airspace_core::{Config, ConsumerEngine, Monitors};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Run the consumer until interrupted or a fatal error occurs.
pub async fn run(config: Config) -> Result<Outcome> {
    info!(
        servers = %config.kafka.brokers(),
        topic = %config.kafka.topic,
        group = %config.kafka.consumer_group,
        store = %config.store.path.display(),
        flush_threshold = config.buffer.flush_threshold,
        "Starting consumer"
    );

    let monitors = Monitors::new();
    let mut engine = ConsumerEngine::connect(&config, monitors.clone()).await?;
    let shutdown_tx = engine.shutdown_signal();

    tokio::spawn(start_server(
        Arc::new(ServerState::new(monitors)),
        config.monitoring.consumer_port,
        shutdown_tx.subscribe(),
    ));

    let interrupted = spawn_signal_handler(shutdown_tx);

    engine.run().await?;

    info!("Consumer stopped");
    Ok(interrupted.outcome())
}
