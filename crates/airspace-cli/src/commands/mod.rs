//! Subcommand implementations.

pub mod consume;
pub mod produce;
pub mod status;
pub mod topic;

use airspace_core::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// How a long-running command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped by SIGINT; the process exits with 130.
    Interrupted,
}

/// Set by the signal task when SIGINT triggered the shutdown.
#[derive(Clone, Default)]
pub struct Interrupted(Arc<AtomicBool>);

impl Interrupted {
    pub fn outcome(&self) -> Outcome {
        if self.0.load(Ordering::SeqCst) {
            Outcome::Interrupted
        } else {
            Outcome::Completed
        }
    }
}

/// Apply Kafka flags given on the command line.
pub fn override_kafka(
    config: &mut Config,
    bootstrap_servers: Option<String>,
    topic: Option<String>,
    consumer_group: Option<String>,
) {
    if let Some(servers) = bootstrap_servers {
        config.kafka.bootstrap_servers = servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(topic) = topic {
        config.kafka.topic = topic;
    }
    if let Some(group) = consumer_group {
        config.kafka.consumer_group = group;
    }
}

/// Forward SIGINT and SIGTERM to the engine's shutdown channel.
pub fn spawn_signal_handler(shutdown_tx: broadcast::Sender<()>) -> Interrupted {
    let interrupted = Interrupted::default();
    let flag = interrupted.0.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                            flag.store(true, Ordering::SeqCst);
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, initiating graceful shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, initiating graceful shutdown");
            flag.store(true, Ordering::SeqCst);
        }

        let _ = shutdown_tx.send(());
    });

    interrupted
}
