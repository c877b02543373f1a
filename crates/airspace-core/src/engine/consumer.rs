//! Consumer pipeline: poll, buffer, bulk upsert, commit.
//!
//! Offsets are committed only after the write that covers them succeeds, so
//! a crash between the two redelivers records that the upsert then
//! overwrites. A failed write keeps the buffer intact and is retried with
//! exponential backoff; once the buffer reaches its hard cap the consumer
//! pauses its partitions until a flush goes through.

use super::Monitors;
use crate::buffer::BatchBuffer;
use crate::config::{BufferConfig, Config};
use crate::health::Component;
use crate::kafka::{EventSource, KafkaConsumerBuilder, KafkaMessage, OffsetTracker, PollResult};
use crate::record::StateVector;
use crate::retry::{Backoff, RetryConfig};
use crate::store::{SqliteStore, StateVectorStore};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, info, warn};

/// Idle polls between liveness notices at info level.
const IDLE_NOTICE_EVERY: u64 = 30;

/// Result of a flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered.
    Empty,
    /// Batch durable; offsets committed if `committed`.
    Written { rows: u64, committed: bool },
    /// Write failed; buffer kept for the next attempt.
    Failed { retry_in: Duration },
}

/// Batched, idempotent materializer.
pub struct ConsumerEngine {
    source: Box<dyn EventSource>,
    store: Arc<dyn StateVectorStore>,
    buffer: BatchBuffer,
    offsets: OffsetTracker,
    backoff: Backoff,
    poll_timeout: Duration,
    monitors: Monitors,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    stopping: bool,
    idle_polls: u64,
}

impl ConsumerEngine {
    pub fn new(
        source: Box<dyn EventSource>,
        store: Arc<dyn StateVectorStore>,
        config: &BufferConfig,
        monitors: Monitors,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for component in [Component::Kafka, Component::Buffer, Component::Store] {
            monitors.health.register_component(component);
        }

        Self {
            source,
            store,
            buffer: BatchBuffer::from_config(config),
            offsets: OffsetTracker::new(),
            backoff: Backoff::new(RetryConfig::from_buffer_config(config)),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            monitors,
            shutdown_tx,
            shutdown_rx,
            stopping: false,
            idle_polls: 0,
        }
    }

    /// Open the store and subscribe to the topic.
    ///
    /// A store that cannot be opened is fatal.
    pub async fn connect(config: &Config, monitors: Monitors) -> Result<Self> {
        config.validate()?;

        let store = match SqliteStore::open(&config.store).await {
            Ok(store) => store,
            Err(e) => {
                monitors
                    .health
                    .mark_unhealthy(Component::Store, &e.to_string());
                return Err(e);
            }
        };
        let source = KafkaConsumerBuilder::new(config.kafka.clone()).build()?;

        let engine = Self::new(Box::new(source), Arc::new(store), &config.buffer, monitors);
        engine.monitors.health.mark_healthy(Component::Store);
        Ok(engine)
    }

    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn monitors(&self) -> &Monitors {
        &self.monitors
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    /// Run until shutdown or a fatal error, then flush and close.
    pub async fn run(&mut self) -> Result<()> {
        self.monitors.health.pipeline_started();
        info!(
            flush_threshold = self.buffer.flush_threshold(),
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "Consumer started"
        );

        let result = loop {
            if self.stop_requested() {
                info!("Shutdown signal received");
                break Ok(());
            }

            if let Err(e) = self.poll_once().await {
                if e.is_fatal() {
                    error!(error = %e, "Consumer stopping on fatal error");
                    break Err(e);
                }
                warn!(error = %e, "Consumer iteration failed");
            }
        };

        self.shutdown().await;
        self.monitors.health.pipeline_stopped();
        result
    }

    /// One iteration: poll a message (or relieve backpressure), then flush if due.
    pub async fn poll_once(&mut self) -> Result<()> {
        if self.buffer.is_full() {
            return self.relieve_backpressure().await;
        }

        match self.source.poll(self.poll_timeout).await {
            PollResult::Message(msg) => self.ingest_message(msg),
            PollResult::Timeout => {
                self.idle_polls += 1;
                debug!(buffered = self.buffer.len(), "No messages within poll timeout");
                if self.idle_polls % IDLE_NOTICE_EVERY == 0 {
                    info!(
                        idle_polls = self.idle_polls,
                        buffered = self.buffer.len(),
                        "Consumer idle"
                    );
                }
            }
            PollResult::Error(e) => {
                self.monitors.metrics.record_delivery_error();
                self.monitors
                    .health
                    .mark_degraded(Component::Kafka, &e.to_string());
                warn!(error = %e, "Delivery error, skipping");
            }
        }

        self.maybe_flush().await?;
        Ok(())
    }

    /// Buffer one message. Malformed payloads are dropped but their offset
    /// still counts as consumed.
    pub fn ingest_message(&mut self, msg: KafkaMessage) {
        self.idle_polls = 0;
        self.offsets
            .update_current(&msg.topic, msg.partition, msg.offset);
        self.monitors.metrics.record_message();
        self.monitors.health.mark_healthy(Component::Kafka);

        match StateVector::from_json_slice(msg.payload()) {
            Ok(record) => {
                self.buffer.push(record);
                self.monitors
                    .metrics
                    .set_buffer_record_count(self.buffer.len());
            }
            Err(e) => {
                self.monitors.metrics.record_malformed();
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    key = msg.key_str().unwrap_or(""),
                    error = %e,
                    "Dropping malformed message"
                );
            }
        }
    }

    /// Flush when the threshold is reached and no retry delay is pending.
    pub async fn maybe_flush(&mut self) -> Result<FlushOutcome> {
        if self.buffer.should_flush() && self.backoff.ready() {
            return self.flush().await;
        }
        Ok(FlushOutcome::Empty)
    }

    /// Write the whole buffer in one upsert, then commit consumed offsets.
    pub async fn flush(&mut self) -> Result<FlushOutcome> {
        if self.buffer.is_empty() {
            // Offsets of dropped messages still move forward.
            let committed = self.commit_pending().await;
            return Ok(if committed {
                FlushOutcome::Written { rows: 0, committed }
            } else {
                FlushOutcome::Empty
            });
        }

        let rows = self.buffer.len();
        let (first_contact, last_contact) = self.buffer.contact_range().unwrap_or_default();
        let start = Instant::now();

        match self.store.upsert_batch(self.buffer.records()).await {
            Ok(written) => {
                let duration = start.elapsed();
                self.buffer.clear();
                self.backoff.record_success();
                self.monitors.metrics.record_flush(written, duration);
                self.monitors.metrics.set_buffer_record_count(0);
                self.monitors.health.mark_healthy(Component::Store);

                info!(
                    rows,
                    first_contact,
                    last_contact,
                    duration_ms = duration.as_millis() as u64,
                    "Batch written to store"
                );

                let committed = self.commit_pending().await;
                Ok(FlushOutcome::Written {
                    rows: written,
                    committed,
                })
            }
            Err(e) => {
                self.monitors.metrics.record_write_failure();
                self.monitors
                    .health
                    .mark_degraded(Component::Store, &e.to_string());

                if e.is_fatal() {
                    error!(rows, first_contact, last_contact, error = %e, "Batch write failed");
                    return Err(e);
                }

                let retry_in = self.backoff.record_failure();
                error!(
                    rows,
                    first_contact,
                    last_contact,
                    attempt = self.backoff.consecutive_failures(),
                    retry_in_ms = retry_in.as_millis() as u64,
                    error = %e,
                    "Batch write failed, keeping buffer for retry"
                );
                Ok(FlushOutcome::Failed { retry_in })
            }
        }
    }

    /// Commit every partition that moved since the last commit.
    ///
    /// A failed commit is retried after the next successful flush.
    async fn commit_pending(&mut self) -> bool {
        let pending = self.offsets.pending_commits();
        if pending.is_empty() {
            return false;
        }

        match self.source.commit(&pending).await {
            Ok(()) => {
                self.offsets.mark_all_committed(&pending);
                debug!(offsets = ?pending, "Offsets committed after write");
                true
            }
            Err(e) => {
                self.monitors.metrics.record_commit_failure();
                self.monitors
                    .health
                    .mark_degraded(Component::Kafka, &e.to_string());
                warn!(error = %e, "Offset commit failed, will retry after next flush");
                false
            }
        }
    }

    /// Buffer at its cap: pause, wait out the backoff, flush, resume.
    async fn relieve_backpressure(&mut self) -> Result<()> {
        if !self.source.is_paused() {
            self.source.pause()?;
            self.monitors.metrics.record_backpressure();
            self.monitors
                .health
                .mark_degraded(Component::Buffer, "Buffer full, consumption paused");
            warn!(buffered = self.buffer.len(), "Buffer full, pausing consumption");
        }

        let wait = self.backoff.remaining();
        if !wait.is_zero() {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    self.stopping = true;
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if let FlushOutcome::Written { .. } = self.flush().await? {
            self.source.resume()?;
            self.monitors.health.mark_healthy(Component::Buffer);
            info!("Buffer drained, consumption resumed");
        }
        Ok(())
    }

    /// Final flush and commit, then close the subscription and the store.
    async fn shutdown(&mut self) {
        info!(buffered = self.buffer.len(), "Shutting down consumer");

        let rows = self.buffer.len();
        match self.flush().await {
            Ok(FlushOutcome::Failed { .. }) | Err(_) => {
                warn!(rows, "Final flush failed, records will be redelivered");
            }
            Ok(_) => {}
        }

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Error closing subscription");
        }
        self.store.close().await;
        info!("Consumer stopped");
    }

    fn stop_requested(&mut self) -> bool {
        self.stopping || !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty))
    }
}
