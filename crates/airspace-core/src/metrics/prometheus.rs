//! Prometheus metrics export.
//!
//! Counters and gauges are plain atomics; the exposition text is rendered on
//! scrape.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for flush duration.
/// Converts to seconds: [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
const FLUSH_DURATION_BUCKETS_MS: [u64; 7] = [100, 250, 500, 1000, 2500, 5000, 10000];

const PREFIX: &str = "airspace";

/// Producer and consumer metrics.
///
/// Each process only moves the counters of its own half; the other half
/// stays at zero in its export.
#[derive(Default)]
pub struct PipelineMetrics {
    // === PRODUCER COUNTERS ===
    ticks_total: AtomicU64,
    poll_failures_total: AtomicU64,
    rate_limited_total: AtomicU64,
    records_polled_total: AtomicU64,
    records_dropped_total: AtomicU64,
    records_published_total: AtomicU64,
    publish_failures_total: AtomicU64,
    token_refreshes_total: AtomicU64,

    // === CONSUMER COUNTERS ===
    messages_consumed_total: AtomicU64,
    messages_malformed_total: AtomicU64,
    delivery_errors_total: AtomicU64,
    flushes_total: AtomicU64,
    rows_written_total: AtomicU64,
    write_failures_total: AtomicU64,
    commit_failures_total: AtomicU64,
    backpressure_total: AtomicU64,

    // === GAUGES ===
    buffer_record_count: AtomicU64,

    // === HISTOGRAM: flush_duration_seconds ===
    flush_duration_sum_ms: AtomicU64,
    flush_duration_count: AtomicU64,
    /// Buckets: [0.1s, 0.25s, 0.5s, 1.0s, 2.5s, 5.0s, 10.0s, +Inf]
    flush_duration_buckets: [AtomicU64; 8],
}

/// Snapshot of the flush duration histogram.
#[derive(Debug, Clone)]
pub struct FlushDurationHistogram {
    pub sum_seconds: f64,
    pub count: u64,
    /// (upper bound in seconds, cumulative count)
    pub buckets: [(f64, u64); 7],
    pub inf_bucket: u64,
}

fn inc(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // === PRODUCER ===

    pub fn record_tick(&self) {
        inc(&self.ticks_total, 1);
    }

    pub fn record_poll_failure(&self, rate_limited: bool) {
        inc(&self.poll_failures_total, 1);
        if rate_limited {
            inc(&self.rate_limited_total, 1);
        }
    }

    /// Records returned by a poll and how many were rejected.
    pub fn record_polled(&self, polled: usize, dropped: usize) {
        inc(&self.records_polled_total, polled as u64);
        inc(&self.records_dropped_total, dropped as u64);
    }

    pub fn record_published(&self, count: usize) {
        inc(&self.records_published_total, count as u64);
    }

    pub fn record_publish_failure(&self) {
        inc(&self.publish_failures_total, 1);
    }

    pub fn record_token_refresh(&self) {
        inc(&self.token_refreshes_total, 1);
    }

    // === CONSUMER ===

    pub fn record_message(&self) {
        inc(&self.messages_consumed_total, 1);
    }

    pub fn record_malformed(&self) {
        inc(&self.messages_malformed_total, 1);
    }

    pub fn record_delivery_error(&self) {
        inc(&self.delivery_errors_total, 1);
    }

    /// Record a successful flush with duration histogram.
    pub fn record_flush(&self, rows: u64, duration: Duration) {
        inc(&self.flushes_total, 1);
        inc(&self.rows_written_total, rows);

        let duration_ms = duration.as_millis() as u64;
        inc(&self.flush_duration_sum_ms, duration_ms);
        inc(&self.flush_duration_count, 1);

        // Buckets are cumulative (le).
        for (i, &bucket_ms) in FLUSH_DURATION_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= bucket_ms {
                inc(&self.flush_duration_buckets[i], 1);
            }
        }
        inc(&self.flush_duration_buckets[7], 1);
    }

    pub fn record_write_failure(&self) {
        inc(&self.write_failures_total, 1);
    }

    pub fn record_commit_failure(&self) {
        inc(&self.commit_failures_total, 1);
    }

    pub fn record_backpressure(&self) {
        inc(&self.backpressure_total, 1);
    }

    pub fn set_buffer_record_count(&self, count: usize) {
        self.buffer_record_count
            .store(count as u64, Ordering::Relaxed);
    }

    // === GETTERS ===

    pub fn ticks_total(&self) -> u64 {
        get(&self.ticks_total)
    }

    pub fn poll_failures_total(&self) -> u64 {
        get(&self.poll_failures_total)
    }

    pub fn records_dropped_total(&self) -> u64 {
        get(&self.records_dropped_total)
    }

    pub fn records_published_total(&self) -> u64 {
        get(&self.records_published_total)
    }

    pub fn publish_failures_total(&self) -> u64 {
        get(&self.publish_failures_total)
    }

    pub fn token_refreshes_total(&self) -> u64 {
        get(&self.token_refreshes_total)
    }

    pub fn messages_consumed_total(&self) -> u64 {
        get(&self.messages_consumed_total)
    }

    pub fn messages_malformed_total(&self) -> u64 {
        get(&self.messages_malformed_total)
    }

    pub fn flushes_total(&self) -> u64 {
        get(&self.flushes_total)
    }

    pub fn rows_written_total(&self) -> u64 {
        get(&self.rows_written_total)
    }

    pub fn write_failures_total(&self) -> u64 {
        get(&self.write_failures_total)
    }

    pub fn backpressure_total(&self) -> u64 {
        get(&self.backpressure_total)
    }

    pub fn buffer_record_count(&self) -> u64 {
        get(&self.buffer_record_count)
    }

    pub fn flush_duration_histogram(&self) -> FlushDurationHistogram {
        let b = &self.flush_duration_buckets;
        FlushDurationHistogram {
            sum_seconds: get(&self.flush_duration_sum_ms) as f64 / 1000.0,
            count: get(&self.flush_duration_count),
            buckets: [
                (0.1, get(&b[0])),
                (0.25, get(&b[1])),
                (0.5, get(&b[2])),
                (1.0, get(&b[3])),
                (2.5, get(&b[4])),
                (5.0, get(&b[5])),
                (10.0, get(&b[6])),
            ],
            inf_bucket: get(&b[7]),
        }
    }

    /// Export all metrics in Prometheus text format.
    ///
    /// # Example
    /// ```
    /// use airspace_core::metrics::PipelineMetrics;
    ///
    /// let metrics = PipelineMetrics::new();
    /// metrics.record_message();
    /// let text = metrics.export_prometheus_text();
    /// assert!(text.contains("airspace_messages_consumed_total 1"));
    /// ```
    pub fn export_prometheus_text(&self) -> String {
        let mut out = String::with_capacity(4096);

        let counters: [(&str, &str, &AtomicU64); 16] = [
            ("ticks_total", "Producer poll cycles started", &self.ticks_total),
            ("poll_failures_total", "State-vector polls that failed", &self.poll_failures_total),
            ("rate_limited_total", "Polls rejected with HTTP 429", &self.rate_limited_total),
            ("records_polled_total", "State vectors returned by the API", &self.records_polled_total),
            ("records_dropped_total", "State vectors rejected before publish", &self.records_dropped_total),
            ("records_published_total", "Records acknowledged by the event log", &self.records_published_total),
            ("publish_failures_total", "Ticks whose publish was aborted", &self.publish_failures_total),
            ("token_refreshes_total", "Access tokens acquired", &self.token_refreshes_total),
            ("messages_consumed_total", "Messages read from the event log", &self.messages_consumed_total),
            ("messages_malformed_total", "Messages dropped as malformed", &self.messages_malformed_total),
            ("delivery_errors_total", "Poll delivery errors", &self.delivery_errors_total),
            ("flushes_total", "Successful batch writes", &self.flushes_total),
            ("rows_written_total", "Rows upserted into the store", &self.rows_written_total),
            ("write_failures_total", "Failed batch writes", &self.write_failures_total),
            ("commit_failures_total", "Failed offset commits", &self.commit_failures_total),
            ("backpressure_total", "Times consumption paused on a full buffer", &self.backpressure_total),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} counter");
            let _ = writeln!(out, "{PREFIX}_{name} {}\n", get(value));
        }

        let _ = writeln!(
            out,
            "# HELP {PREFIX}_buffer_record_count Records waiting for the next flush"
        );
        let _ = writeln!(out, "# TYPE {PREFIX}_buffer_record_count gauge");
        let _ = writeln!(
            out,
            "{PREFIX}_buffer_record_count {}\n",
            self.buffer_record_count()
        );

        let hist = self.flush_duration_histogram();
        let _ = writeln!(
            out,
            "# HELP {PREFIX}_flush_duration_seconds Duration of batch writes"
        );
        let _ = writeln!(out, "# TYPE {PREFIX}_flush_duration_seconds histogram");
        for (le, count) in &hist.buckets {
            let _ = writeln!(
                out,
                "{PREFIX}_flush_duration_seconds_bucket{{le=\"{le}\"}} {count}"
            );
        }
        let _ = writeln!(
            out,
            "{PREFIX}_flush_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            hist.inf_bucket
        );
        let _ = writeln!(
            out,
            "{PREFIX}_flush_duration_seconds_sum {}",
            hist.sum_seconds
        );
        let _ = writeln!(out, "{PREFIX}_flush_duration_seconds_count {}", hist.count);

        out
    }
}
