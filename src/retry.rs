use std::time::Duration;

use backoff::backoff::Backoff;

/// A backoff policy that always returns the same interval, until it exceeds
/// the maximum retry count.
#[derive(Debug)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a constant backoff that waits `interval` between attempts and
    /// gives up after `max_retry_count` retries.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self { interval, max_retry_count, count: 0 }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count < self.max_retry_count {
            self.count += 1;
            Some(self.interval)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}
