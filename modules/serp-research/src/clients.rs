//! SERP and ranked-keyword clients: cache, pacing and retry over a
//! [`SearchProvider`].
//!
//! Every attempt that reaches the provider first passes the shared rate
//! limiter and counts as one API call. Failures never leave this module as
//! errors; callers see an empty result and carry on with what they have.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::cache_key;
use crate::context::ResearchContext;
use crate::traits::SearchProvider;
use crate::types::{RankedKeywordRecord, SerpResult, SERP_DEPTH};

/// Cache operation names. Distinct per operation so keys never collide.
pub const SERP_OPERATION: &str = "serp_top_urls";
pub const RANKED_KEYWORDS_OPERATION: &str = "ranked_keywords";

/// How many ranked keywords to request per URL.
pub const RANKED_KEYWORDS_LIMIT: u32 = 100;

/// Result of one external call once retries are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Data(T),
    /// The service answered but had nothing for us.
    Empty,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Still failing after the last retry (timeouts, 429, 5xx).
    Transient,
    /// Not worth retrying (auth, bad request, malformed payload).
    Permanent,
}

impl<T> FetchOutcome<T> {
    pub fn into_data(self) -> Option<T> {
        match self {
            FetchOutcome::Data(data) => Some(data),
            FetchOutcome::Empty | FetchOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-based): base, 2×base, 4×base…
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `call` until it succeeds, fails permanently, or the retry budget runs out.
async fn call_with_retry<T, F, Fut>(
    ctx: &ResearchContext,
    policy: &RetryPolicy,
    operation: &str,
    subject: &str,
    mut call: F,
) -> FetchOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = dataforseo_client::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        ctx.rate_limiter.acquire().await;
        ctx.metrics.record_api_call();

        match call().await {
            Ok(data) => return FetchOutcome::Data(data),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    subject,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient API error, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                let kind = if e.is_transient() {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                };
                warn!(operation, subject, attempt, ?kind, error = %e, "API call failed, treating as no data");
                return FetchOutcome::Failed(kind);
            }
        }
    }
}

// --- SERP ---

pub struct SerpClient {
    provider: Arc<dyn SearchProvider>,
    ctx: Arc<ResearchContext>,
    retry: RetryPolicy,
}

impl SerpClient {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        ctx: Arc<ResearchContext>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            ctx,
            retry,
        }
    }

    /// Top organic URLs for `keyword`, served from cache when fresh.
    /// Empty when the keyword is blank or the service had nothing usable.
    pub async fn fetch_top_urls(&self, keyword: &str) -> SerpResult {
        if keyword.trim().is_empty() {
            return Vec::new();
        }

        let key = cache_key(keyword, SERP_OPERATION, self.provider.identity());
        self.ctx
            .cache
            .get_or_compute(&key, || async move {
                self.fetch_uncached(keyword)
                    .await
                    .into_data()
                    .unwrap_or_default()
            })
            .await
    }

    /// Straight to the provider, no cache.
    pub async fn fetch_uncached(&self, keyword: &str) -> FetchOutcome<SerpResult> {
        debug!(keyword, "Fetching top organic URLs");
        let outcome = call_with_retry(&self.ctx, &self.retry, SERP_OPERATION, keyword, move || {
            self.provider.top_organic_urls(keyword, SERP_DEPTH as u32)
        })
        .await;

        match outcome {
            FetchOutcome::Data(mut urls) => {
                urls.retain(|u| !u.is_empty());
                urls.truncate(SERP_DEPTH);
                if urls.is_empty() {
                    FetchOutcome::Empty
                } else {
                    FetchOutcome::Data(urls)
                }
            }
            other => other,
        }
    }
}

// --- Ranked keywords ---

pub struct RankedKeywordClient {
    provider: Arc<dyn SearchProvider>,
    ctx: Arc<ResearchContext>,
    retry: RetryPolicy,
}

impl RankedKeywordClient {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        ctx: Arc<ResearchContext>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            ctx,
            retry,
        }
    }

    /// Keywords `url` ranks for in positions 1–10, served from cache when fresh.
    ///
    /// Records outside the top ten or without keyword text are always dropped;
    /// dedup and overlap scoring downstream rely on that.
    pub async fn fetch_ranked_keywords(&self, url: &str) -> Vec<RankedKeywordRecord> {
        if url.trim().is_empty() {
            return Vec::new();
        }

        let key = cache_key(url, RANKED_KEYWORDS_OPERATION, self.provider.identity());
        self.ctx
            .cache
            .get_or_compute(&key, || async move {
                self.fetch_uncached(url)
                    .await
                    .into_data()
                    .unwrap_or_default()
            })
            .await
    }

    /// Straight to the provider, no cache. Top-ten filter applied.
    pub async fn fetch_uncached(&self, url: &str) -> FetchOutcome<Vec<RankedKeywordRecord>> {
        debug!(url, "Fetching ranked keywords");
        let outcome = call_with_retry(
            &self.ctx,
            &self.retry,
            RANKED_KEYWORDS_OPERATION,
            url,
            move || self.provider.ranked_keywords(url, RANKED_KEYWORDS_LIMIT),
        )
        .await;

        match outcome {
            FetchOutcome::Data(records) => {
                let raw = records.len();
                let top_ten: Vec<RankedKeywordRecord> = records
                    .into_iter()
                    .filter(RankedKeywordRecord::is_top_ten)
                    .map(|mut r| {
                        r.keyword = r.keyword.trim().to_string();
                        r
                    })
                    .collect();
                debug!(url, raw, kept = top_ten.len(), "Filtered ranked keywords to top 10");
                if top_ten.is_empty() {
                    FetchOutcome::Empty
                } else {
                    FetchOutcome::Data(top_ten)
                }
            }
            other => other,
        }
    }
}
