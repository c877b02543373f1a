//! Exponential backoff for retried store writes.
//!
//! Backoff formula: min(max_delay, base_delay * 2^attempt) + jitter

use crate::config::BufferConfig;
use std::time::Duration;

/// Configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Whether to add ±25% jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Flush retry timing from the buffer section.
    pub fn from_buffer_config(config: &BufferConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    /// Disable jitter (for testing).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff delay for a given attempt, starting at 0.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_delay_ms = delay_ms.min(max_ms);

        let final_delay_ms = if self.jitter {
            let jitter_range = capped_delay_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_delay_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms)
    }
}

/// Consecutive-failure counter paired with a retry window.
///
/// Driven by the tokio clock so paused-time tests can step through it.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
    retry_at: Option<tokio::time::Instant>,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
            retry_at: None,
        }
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.config.calculate_delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.retry_at = Some(tokio::time::Instant::now() + delay);
        delay
    }

    /// Reset after a success.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    /// Whether the retry window has elapsed.
    pub fn ready(&self) -> bool {
        self.retry_at
            .map_or(true, |at| tokio::time::Instant::now() >= at)
    }

    /// Time left until the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.retry_at
            .map(|at| at.saturating_duration_since(tokio::time::Instant::now()))
            .unwrap_or_default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_delay_exponential() {
        let config =
            RetryConfig::new(Duration::from_millis(100), Duration::from_secs(30)).without_jitter();

        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_calculate_delay_caps_at_max() {
        let config =
            RetryConfig::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter();

        assert_eq!(config.calculate_delay(10), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(100), Duration::from_millis(1000));
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let config = RetryConfig::new(Duration::from_millis(1000), Duration::from_secs(30));

        let delay = config.calculate_delay(0);
        assert!(delay >= Duration::from_millis(750));
        assert!(delay <= Duration::from_millis(1250));
    }

    #[test]
    fn test_from_buffer_config() {
        let config = RetryConfig::from_buffer_config(&BufferConfig::default());
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_window() {
        let mut backoff = Backoff::new(
            RetryConfig::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter(),
        );
        assert!(backoff.ready());

        assert_eq!(backoff.record_failure(), Duration::from_millis(100));
        assert!(!backoff.ready());
        assert_eq!(backoff.remaining(), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(backoff.ready());

        assert_eq!(backoff.record_failure(), Duration::from_millis(200));
        assert_eq!(backoff.consecutive_failures(), 2);

        backoff.record_success();
        assert!(backoff.ready());
        assert_eq!(backoff.consecutive_failures(), 0);
    }
}
