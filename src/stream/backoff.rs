//! Reconnect timing for the user-data stream.

use crate::config::StreamConfig;
use std::time::Duration;

/// Wait times between connection attempts.
///
/// A failed connect waits a fixed interval. A session that ends after it was
/// established waits `unit * 2^n`, where `n` counts consecutive sessions that
/// failed before delivering anything.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    connect_retry: Duration,
    backoff_unit: Duration,
    max_backoff: Duration,
    retry_count: u32,
}

impl ReconnectPolicy {
    pub fn new(connect_retry: Duration, backoff_unit: Duration, max_backoff: Duration) -> Self {
        Self {
            connect_retry,
            backoff_unit,
            max_backoff,
            retry_count: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connect_retry_secs),
            Duration::from_secs(1),
            Duration::from_secs(config.max_backoff_secs),
        )
    }

    /// The stream delivered data; start counting from zero again.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    pub fn on_connect_failure(&self) -> Duration {
        self.connect_retry
    }

    /// Wait before reconnecting after an established session failed.
    pub fn on_stream_error(&mut self) -> Duration {
        let wait = 2u32
            .checked_pow(self.retry_count)
            .and_then(|factor| self.backoff_unit.checked_mul(factor))
            .map_or(self.max_backoff, |wait| wait.min(self.max_backoff));
        self.retry_count = self.retry_count.saturating_add(1);
        wait
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}
