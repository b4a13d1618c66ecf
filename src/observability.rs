//! Download counters shared by every task of a downloader

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    attempts: AtomicU64,
    retries: AtomicU64,
    images_saved: AtomicU64,
    images_failed: AtomicU64,
    bytes_written: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_started(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn image_saved(&self, bytes: u64) {
        self.images_saved.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        tracing::trace!(counter = "images_saved", bytes, "Metric incremented");
    }

    pub fn image_failed(&self) {
        self.images_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "images_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            images_saved: self.images_saved.load(Ordering::Relaxed),
            images_failed: self.images_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub retries: u64,
    pub images_saved: u64,
    pub images_failed: u64,
    pub bytes_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.attempt_started();
        metrics.attempt_started();
        metrics.retry_scheduled();
        metrics.image_saved(100);
        metrics.image_saved(28);
        metrics.image_failed();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                attempts: 2,
                retries: 1,
                images_saved: 2,
                images_failed: 1,
                bytes_written: 128,
            }
        );
    }
}
