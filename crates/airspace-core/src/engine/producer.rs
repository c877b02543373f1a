//! Producer pipeline: poll, map, publish, flush, sleep.

use super::Monitors;
use crate::auth::{OAuthClient, TokenManager};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::ApiError;
use crate::health::Component;
use crate::kafka::{EventPublisher, KafkaEventPublisher};
use crate::opensky::{BoundingBox, OpenSkyClient, StateVectorSource};
use crate::record::{map_states, StateVector};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, info, warn};

/// Cadence and region of the producer loop.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub bounding_box: BoundingBox,
    pub poll_interval: Duration,
}

impl ProducerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bounding_box: config.opensky.bounding_box,
            poll_interval: Duration::from_secs(config.opensky.poll_interval_secs),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Records were published and acknowledged.
    Published { records: usize, dropped: usize },
    /// The snapshot held no valid records.
    Empty { dropped: usize },
    /// The poll failed; nothing was published.
    PollFailed { retry_after: Option<Duration> },
    /// Publishing was aborted part way; some records may be on the log.
    PublishFailed { attempted: usize },
}

/// Fixed-cadence poller publishing state vectors to the event log.
pub struct ProducerEngine {
    settings: ProducerSettings,
    tokens: TokenManager,
    source: Arc<dyn StateVectorSource>,
    publisher: Arc<dyn EventPublisher>,
    monitors: Monitors,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    sample_logged: bool,
}

impl ProducerEngine {
    pub fn new(
        settings: ProducerSettings,
        tokens: TokenManager,
        source: Arc<dyn StateVectorSource>,
        publisher: Arc<dyn EventPublisher>,
        monitors: Monitors,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for component in [Component::OpenSky, Component::Auth, Component::Kafka] {
            monitors.health.register_component(component);
        }

        Self {
            settings,
            tokens,
            source,
            publisher,
            monitors,
            shutdown_tx,
            shutdown_rx,
            sample_logged: false,
        }
    }

    /// Wire the engine to the real API, token endpoint and Kafka.
    pub fn connect(config: &Config, monitors: Monitors) -> Result<Self> {
        config.validate()?;
        config.validate_credentials()?;

        let exchange = OAuthClient::from_config(&config.auth)?;
        let tokens = TokenManager::new(Arc::new(exchange), Arc::new(SystemClock));

        let source = OpenSkyClient::new(
            config.opensky.api_url.clone(),
            Duration::from_secs(config.opensky.request_timeout_secs),
        )?;
        let publisher = KafkaEventPublisher::new(&config.kafka)?;

        Ok(Self::new(
            ProducerSettings::from_config(config),
            tokens,
            Arc::new(source),
            Arc::new(publisher),
            monitors,
        ))
    }

    /// Sender that stops [`ProducerEngine::run`] at the next iteration boundary.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn monitors(&self) -> &Monitors {
        &self.monitors
    }

    /// Run until shutdown or a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        self.monitors.health.pipeline_started();
        info!(
            bbox = ?self.settings.bounding_box,
            interval_secs = self.settings.poll_interval.as_secs(),
            "Producer started"
        );

        let result = loop {
            if self.stop_requested() {
                info!("Shutdown signal received");
                break Ok(());
            }

            let delay = match self.tick().await {
                Ok(TickOutcome::PollFailed {
                    retry_after: Some(retry_after),
                }) => {
                    let delay = retry_after.max(self.settings.poll_interval);
                    if delay > self.settings.poll_interval {
                        info!(delay_secs = delay.as_secs(), "Backing off after rate limit");
                    }
                    delay
                }
                Ok(_) => self.settings.poll_interval,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Producer stopping on fatal error");
                    break Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Tick failed");
                    self.settings.poll_interval
                }
            };

            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        if let Err(e) = self.publisher.flush().await {
            warn!(error = %e, "Final producer flush failed");
        }
        self.monitors.health.pipeline_stopped();
        info!("Producer stopped");

        result
    }

    /// One poll/publish cycle.
    ///
    /// Only fatal errors are returned as `Err`; everything else is reported
    /// through the outcome.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let metrics = &self.monitors.metrics;
        let health = &self.monitors.health;
        metrics.record_tick();

        let refreshes = self.tokens.refresh_count();
        let token = match self.tokens.ensure_valid().await {
            Ok(token) => token,
            Err(e) => {
                health.mark_unhealthy(Component::Auth, &e.to_string());
                return Err(e);
            }
        };
        if self.tokens.refresh_count() > refreshes {
            metrics.record_token_refresh();
        }
        health.mark_healthy(Component::Auth);

        let snapshot = match self
            .source
            .fetch_states(&self.settings.bounding_box, &token)
            .await
        {
            Ok(snapshot) => {
                health.mark_healthy(Component::OpenSky);
                snapshot
            }
            Err(e) => {
                let rate_limited = matches!(e, ApiError::RateLimited { .. });
                if matches!(e, ApiError::Unauthorized { .. }) {
                    self.tokens.invalidate();
                }
                metrics.record_poll_failure(rate_limited);
                health.mark_degraded(Component::OpenSky, &e.to_string());
                warn!(error = %e, "State vector poll failed");
                return Ok(TickOutcome::PollFailed {
                    retry_after: e.retry_after(),
                });
            }
        };

        let states = snapshot.states();
        let mapped = map_states(states);
        let dropped = mapped.rejected.len();
        metrics.record_polled(states.len(), dropped);

        if mapped.records.is_empty() {
            debug!(snapshot_time = snapshot.time, dropped, "No aircraft in bounding box");
            return Ok(TickOutcome::Empty { dropped });
        }

        if !self.sample_logged {
            info!(record = ?mapped.records[0], "First state vector");
            self.sample_logged = true;
        }

        let attempted = mapped.records.len();
        match self.publish_all(&mapped.records).await {
            Ok(delivered) => {
                metrics.record_published(delivered);
                health.mark_healthy(Component::Kafka);
                info!(
                    records = delivered,
                    dropped,
                    snapshot_time = snapshot.time,
                    "Published state vectors"
                );
                Ok(TickOutcome::Published {
                    records: delivered,
                    dropped,
                })
            }
            Err(e) => {
                metrics.record_publish_failure();
                health.mark_degraded(Component::Kafka, &e.to_string());
                warn!(attempted, error = %e, "Publish aborted for this tick");
                Ok(TickOutcome::PublishFailed { attempted })
            }
        }
    }

    /// Publish every record and wait for all acknowledgements.
    ///
    /// Whatever stops the enqueue loop, records already handed to the
    /// publisher are settled before the error is returned.
    async fn publish_all(&self, records: &[StateVector]) -> Result<usize> {
        if let Err(e) = self.enqueue_all(records).await {
            if let Err(flush_err) = self.publisher.flush().await {
                debug!(error = %flush_err, "Flush after publish failure also failed");
            }
            return Err(e);
        }

        self.publisher.flush().await
    }

    async fn enqueue_all(&self, records: &[StateVector]) -> Result<()> {
        for record in records {
            let payload = record.to_json_bytes().map_err(Error::from)?;
            self.publisher.publish(record.key(), payload).await?;
        }
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty))
    }
}
