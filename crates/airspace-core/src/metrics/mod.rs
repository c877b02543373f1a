//! Pipeline metrics and Prometheus text export.

mod prometheus;

pub use prometheus::{FlushDurationHistogram, PipelineMetrics};
