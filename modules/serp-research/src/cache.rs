//! SQLite-backed memo cache with per-entry expiry.
//!
//! Lookups only ever see rows whose `expires_at` is in the future; expired
//! rows stay on disk until [`CacheStore::cleanup_expired`] runs. Every storage
//! failure is logged and treated as a miss, so a broken cache slows a run down
//! but never fails it.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::types::{RankedKeywordRecord, ResearchResult};

/// Values worth persisting. Empty fetches are never cached so a transient
/// upstream failure does not stick for a whole TTL.
pub trait Cacheable {
    fn is_cacheable(&self) -> bool;
}

impl Cacheable for Vec<String> {
    fn is_cacheable(&self) -> bool {
        !self.is_empty()
    }
}

impl Cacheable for Vec<RankedKeywordRecord> {
    fn is_cacheable(&self) -> bool {
        !self.is_empty()
    }
}

impl Cacheable for ResearchResult {
    fn is_cacheable(&self) -> bool {
        self.is_complete()
    }
}

/// Cache key for one logical operation on one keyword (or URL) for one account.
/// The tuple is JSON-encoded before hashing so field boundaries are unambiguous.
pub fn cache_key(subject: &str, operation: &str, identity: &str) -> String {
    let encoded = serde_json::to_vec(&(subject, operation, identity)).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

pub struct CacheStore {
    pool: SqlitePool,
    ttl: Duration,
    metrics: Arc<Metrics>,
    /// One gate per key currently being computed.
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheStore {
    /// Open (creating if needed) the cache database at `url`, e.g.
    /// `sqlite://keyword_research_cache.db`.
    pub async fn open(url: &str, ttl: Duration, metrics: Arc<Metrics>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, ttl, metrics).await
    }

    /// Private in-memory database. A single connection that never idles out,
    /// since every new SQLite memory connection is a fresh empty database.
    pub async fn in_memory(ttl: Duration, metrics: Arc<Metrics>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, ttl, metrics).await
    }

    async fn with_pool(pool: SqlitePool, ttl: Duration, metrics: Arc<Metrics>) -> Result<Self> {
        let store = Self {
            pool,
            ttl,
            metrics,
            in_flight: Mutex::new(HashMap::new()),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache (expires_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Return the cached value for `key`, or run `compute` and persist its
    /// result when it is worth caching. `compute` is never invoked on a hit.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> T
    where
        T: Cacheable + Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result = self
            .get_or_try_compute(key, || async move { Ok::<T, Infallible>(compute().await) })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`get_or_compute`](Self::get_or_compute). Errors
    /// from `compute` are returned as-is and nothing is stored.
    ///
    /// Concurrent callers missing on the same key are serialized: the first
    /// computes, the rest wait on the key's gate and are then served from the
    /// freshly written row.
    pub async fn get_or_try_compute<T, E, F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        T: Cacheable + Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.metrics.record_request();

        if let Some(hit) = self.lookup(key).await {
            self.metrics.record_cache_hit();
            return Ok(hit);
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.entry(key.to_string()).or_default().clone()
        };
        let _gate = GateGuard {
            registry: &self.in_flight,
            key,
            held: Some(gate.lock_owned().await),
        };

        // Another caller may have filled the row while we waited on the gate.
        if let Some(hit) = self.lookup(key).await {
            self.metrics.record_cache_hit();
            return Ok(hit);
        }

        let result = compute().await;
        if let Ok(value) = &result {
            if value.is_cacheable() {
                self.store(key, value).await;
            }
        }
        result
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Utc::now().timestamp_millis();
        let query = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM cache WHERE key = ?1 AND expires_at > ?2",
        );
        let row = match query.bind(key).bind(now).fetch_optional(&self.pool).await {
            Ok(row) => row,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let (value,) = row?;
        match serde_json::from_str(&value) {
            Ok(parsed) => {
                debug!(key, "Cache hit");
                Some(parsed)
            }
            Err(e) => {
                warn!(key, error = %e, "Cached value failed to deserialize, treating as miss");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };

        let now = Utc::now();
        let Some(expires_at) = now.checked_add_signed(self.ttl) else {
            warn!(key, ttl_hours = self.ttl.num_hours(), "Cache expiry out of range, skipping write");
            return;
        };
        let result = sqlx::query(
            "INSERT OR REPLACE INTO cache (key, value, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(key)
        .bind(payload)
        .bind(now.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Delete every expired row. Returns how many were removed; failures are
    /// logged and reported as zero.
    pub async fn cleanup_expired(&self) -> u64 {
        let now = Utc::now().timestamp_millis();
        match sqlx::query("DELETE FROM cache WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await
        {
            Ok(result) => {
                let deleted = result.rows_affected();
                if deleted > 0 {
                    info!(deleted, "Cleaned up expired cache entries");
                }
                deleted
            }
            Err(e) => {
                warn!(error = %e, "Failed to clean up expired cache entries");
                0
            }
        }
    }

    /// Number of rows on disk, expired or not.
    pub async fn len(&self) -> u64 {
        match sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM cache")
            .fetch_one(&self.pool)
            .await
        {
            Ok((count,)) => count.max(0) as u64,
            Err(e) => {
                warn!(error = %e, "Failed to count cache entries");
                0
            }
        }
    }
}

/// Holds a key's gate and drops it from the registry on release, including
/// when the computation unwinds.
struct GateGuard<'a> {
    registry: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    key: &'a str,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut in_flight = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the registry's own reference left: no other holders or waiters.
        if in_flight
            .get(self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            in_flight.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    async fn store_with_ttl(ttl: Duration) -> (CacheStore, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let store = CacheStore::in_memory(ttl, metrics.clone()).await.unwrap();
        (store, metrics)
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keys_differ_per_operation_and_identity() {
        let serp = cache_key("running shoes", "serp_top_urls", "acct");
        let ranked = cache_key("running shoes", "ranked_keywords", "acct");
        let other_account = cache_key("running shoes", "serp_top_urls", "other");
        assert_ne!(serp, ranked);
        assert_ne!(serp, other_account);
        assert_eq!(serp, cache_key("running shoes", "serp_top_urls", "acct"));
        assert_eq!(serp.len(), 64);
    }

    #[test]
    fn keys_do_not_collide_on_separator() {
        assert_ne!(cache_key("a_b", "c", "d"), cache_key("a", "b_c", "d"));
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let (store, metrics) = store_with_ttl(Duration::hours(24)).await;
        let calls = AtomicUsize::new(0);
        let key = cache_key("seo tools", "serp_top_urls", "acct");

        let first: Vec<String> = store
            .get_or_compute(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                urls(&["https://a.com", "https://b.com"])
            })
            .await;
        let second: Vec<String> = store
            .get_or_compute(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                urls(&["https://changed.com"])
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.cache_hits, 1);
    }

    #[tokio::test]
    async fn cached_records_round_trip_exactly() {
        let (store, _) = store_with_ttl(Duration::hours(1)).await;
        let key = cache_key("https://a.com/page", "ranked_keywords", "acct");
        let records = vec![RankedKeywordRecord {
            keyword: "dog safe vegetables".into(),
            position: 4,
            search_volume: 2400,
            cpc: 0.37,
            competition: 0.1234567,
        }];

        let first = store.get_or_compute(&key, || async { records.clone() }).await;
        let second: Vec<RankedKeywordRecord> =
            store.get_or_compute(&key, || async { Vec::new() }).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_values_are_not_cached() {
        let (store, _) = store_with_ttl(Duration::hours(1)).await;
        let calls = AtomicUsize::new(0);
        let key = cache_key("nothing", "serp_top_urls", "acct");

        for _ in 0..2 {
            let value: Vec<String> = store
                .get_or_compute(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Vec::new()
                })
                .await;
            assert!(value.is_empty());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed_and_cleaned() {
        let (store, _) = store_with_ttl(Duration::zero()).await;
        let calls = AtomicUsize::new(0);
        let key = cache_key("stale", "serp_top_urls", "acct");

        for _ in 0..2 {
            let _: Vec<String> = store
                .get_or_compute(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    urls(&["https://a.com"])
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 1);

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn unrepresentable_expiry_skips_the_write() {
        let (store, _) = store_with_ttl(Duration::try_days(365 * 1_000_000).unwrap()).await;
        let calls = AtomicUsize::new(0);
        let key = cache_key("forever", "serp_top_urls", "acct");

        for _ in 0..2 {
            let value: Vec<String> = store
                .get_or_compute(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    urls(&["https://a.com"])
                })
                .await;
            assert_eq!(value, urls(&["https://a.com"]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn cleanup_keeps_live_entries() {
        let (store, _) = store_with_ttl(Duration::hours(1)).await;
        let key = cache_key("fresh", "serp_top_urls", "acct");
        let _: Vec<String> = store
            .get_or_compute(&key, || async { urls(&["https://a.com"]) })
            .await;

        assert_eq!(store.cleanup_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn compute_errors_pass_through_uncached() {
        let (store, _) = store_with_ttl(Duration::hours(1)).await;
        let key = cache_key("boom", "full_research", "acct");

        let result: Result<Vec<String>, String> = store
            .get_or_try_compute(&key, || async { Err("upstream exploded".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "upstream exploded");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_compute_releases_its_gate() {
        let (store, _) = store_with_ttl(Duration::hours(1)).await;
        let store = Arc::new(store);
        let key = cache_key("explodes", "full_research", "acct");

        let task = {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                store
                    .get_or_compute::<Vec<String>, _, _>(&key, || async {
                        panic!("compute failed")
                    })
                    .await
            })
        };
        assert!(task.await.unwrap_err().is_panic());
        assert!(store.in_flight.lock().unwrap().is_empty());

        // The key is usable again.
        let value: Vec<String> = store
            .get_or_compute(&key, || async { urls(&["https://a.com"]) })
            .await;
        assert_eq!(value, urls(&["https://a.com"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let (store, metrics) = store_with_ttl(Duration::hours(1)).await;
        let store = Arc::new(store);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = cache_key("popular", "serp_top_urls", "acct");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let calls = calls.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .get_or_compute(&key, || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                            vec!["https://a.com".to_string()]
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec!["https://a.com".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().cache_hits, 7);
        assert!(store.in_flight.lock().unwrap().is_empty());
    }
}
