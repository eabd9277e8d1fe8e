//! Process-wide research counters, shared by every pipeline in a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    api_calls: AtomicU64,
    batch_requests: AtomicU64,
}

/// Point-in-time copy of [`Metrics`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub batch_requests: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache lookup was attempted.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt actually went out to the external service.
    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_items(&self, count: u64) {
        self.batch_requests.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
            batch_requests: self.batch_requests.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Hits as a share of all served lookups (hits + external calls), in percent.
    pub fn cache_hit_rate(&self) -> f64 {
        let served = (self.cache_hits + self.api_calls).max(1);
        self.cache_hits as f64 / served as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_with_no_traffic_is_zero() {
        assert_eq!(Metrics::new().snapshot().cache_hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_counts_hits_against_calls() {
        let metrics = Metrics::new();
        for _ in 0..3 {
            metrics.record_cache_hit();
        }
        metrics.record_api_call();

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 3);
        assert_eq!(snap.api_calls, 1);
        assert_eq!(snap.cache_hit_rate(), 75.0);
    }

    #[test]
    fn batch_items_accumulate() {
        let metrics = Metrics::new();
        metrics.record_batch_items(4);
        metrics.record_batch_items(2);
        assert_eq!(metrics.snapshot().batch_requests, 6);
    }
}
