//! The two long-running pipelines.
//!
//! [`ProducerEngine`] polls the state-vector API on a fixed cadence and
//! publishes keyed records to the event log. [`ConsumerEngine`] reads them
//! back, buffers them and writes them to the analytical store in bulk,
//! committing offsets only after each write succeeds. The two only share the
//! topic.

mod consumer;
mod producer;

pub use consumer::{ConsumerEngine, FlushOutcome};
pub use producer::{ProducerEngine, ProducerSettings, TickOutcome};

use crate::health::HealthCheck;
use crate::metrics::PipelineMetrics;
use std::sync::Arc;

/// Metrics and health shared between an engine and the HTTP server.
#[derive(Clone, Default)]
pub struct Monitors {
    pub metrics: Arc<PipelineMetrics>,
    pub health: Arc<HealthCheck>,
}

impl Monitors {
    pub fn new() -> Self {
        Self::default()
    }
}
