//! Shared state for one research run: cache, pacing and counters.
//!
//! Created once per run and handed to every pipeline by `Arc`. Nothing else is
//! shared between concurrently running pipelines.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::cache::CacheStore;
use crate::config::ResearchConfig;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::rate_limiter::RateLimiter;

pub struct ResearchContext {
    pub cache: CacheStore,
    pub rate_limiter: RateLimiter,
    pub metrics: Arc<Metrics>,
}

impl ResearchContext {
    /// Open the configured cache database. If it cannot be opened the run
    /// continues on a private in-memory cache.
    pub async fn connect(config: &ResearchConfig) -> Result<Self> {
        let ttl = config.cache_ttl()?;
        let metrics = Arc::new(Metrics::new());
        let cache = match CacheStore::open(&config.cache_db_url, ttl, metrics.clone()).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(
                    url = config.cache_db_url.as_str(),
                    error = %e,
                    "Failed to open cache database, falling back to in-memory cache"
                );
                CacheStore::in_memory(ttl, metrics.clone()).await?
            }
        };

        Ok(Self {
            cache,
            rate_limiter: RateLimiter::new(config.min_request_interval),
            metrics,
        })
    }

    /// In-memory cache, for tests and one-off runs.
    pub async fn in_memory(ttl: chrono::Duration, min_interval: Duration) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let cache = CacheStore::in_memory(ttl, metrics.clone()).await?;
        Ok(Self {
            cache,
            rate_limiter: RateLimiter::new(min_interval),
            metrics,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
